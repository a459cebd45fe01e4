//! Fixture archives for integration tests

use std::fs;
use std::path::Path;

use reindexer::ArchiveLayout;

const NAMESPACE: &str = "http://www.sa.dk/xmlns/siard/1.0/schema0";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One table of a fixture archive
pub struct FixtureTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// Row bodies, e.g. `<c1>1</c1><c2/>`
    pub rows: &'static [&'static str],
}

/// Write an archive named `name` under `dir` with the tables numbered in order
pub fn write_archive(dir: &Path, name: &str, tables: &[FixtureTable]) -> ArchiveLayout {
    let layout = ArchiveLayout::new(dir.join(name));
    fs::create_dir_all(layout.index_path().parent().unwrap()).unwrap();

    let mut index = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<siardDiark xmlns=\"http://www.sa.dk/xmlns/diark/1.0\">\n  <version>1.0</version>\n  <tables>\n",
    );

    for (i, table) in tables.iter().enumerate() {
        let number = i as u32 + 1;
        index.push_str(&index_entry(number, table));

        fs::create_dir_all(layout.table_dir(number)).unwrap();
        fs::write(layout.rows_path(number), rows(number, table.rows)).unwrap();
        fs::write(layout.schema_path(number), schema(number, table.columns.len())).unwrap();
    }

    index.push_str("  </tables>\n</siardDiark>\n");
    fs::write(layout.index_path(), index).unwrap();
    layout
}

fn index_entry(number: u32, table: &FixtureTable) -> String {
    let columns: String = table
        .columns
        .iter()
        .enumerate()
        .map(|(c, name)| {
            format!(
                "        <column>\n          <name>{name}</name>\n          <columnID>c{}</columnID>\n          <type>VARCHAR(100)</type>\n          <nullable>true</nullable>\n        </column>\n",
                c + 1
            )
        })
        .collect();

    format!(
        "    <table>\n      <name>{}</name>\n      <folder>table{number}</folder>\n      <description>{} rows</description>\n      <columns>\n{columns}      </columns>\n      <rows>{}</rows>\n    </table>\n",
        table.name,
        table.name,
        table.rows.len()
    )
}

fn rows(number: u32, bodies: &[&str]) -> String {
    let rows: String = bodies
        .iter()
        .map(|body| format!("  <row>{body}</row>\n"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<table xsi:schemaLocation=\"{NAMESPACE}/table{number}.xsd ./table{number}.xsd\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xmlns=\"{NAMESPACE}/table{number}.xsd\">\n{rows}</table>\n"
    )
}

fn schema(number: u32, columns: usize) -> String {
    let elements: String = (1..=columns)
        .map(|c| format!("      <xs:element name=\"c{c}\" type=\"xs:string\" minOccurs=\"0\"/>\n"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xs:schema xmlns=\"{NAMESPACE}/table{number}.xsd\" xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" targetNamespace=\"{NAMESPACE}/table{number}.xsd\" elementFormDefault=\"qualified\">\n  <xs:element name=\"table\">\n    <xs:complexType>\n      <xs:sequence>\n        <xs:element name=\"row\" type=\"rowType\" minOccurs=\"0\" maxOccurs=\"unbounded\"/>\n      </xs:sequence>\n    </xs:complexType>\n  </xs:element>\n  <xs:complexType name=\"rowType\">\n    <xs:sequence>\n{elements}    </xs:sequence>\n  </xs:complexType>\n</xs:schema>\n"
    )
}
