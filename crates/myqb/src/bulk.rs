//! `LOAD DATA` / `LOAD XML` statements.

use crate::sql::escape_string;
use std::path::Path;

/// Options for [`Db::load_data`](crate::Db::load_data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDataOptions {
    pub field_terminator: String,
    pub field_enclosure: Option<String>,
    pub line_terminator: String,
    pub line_starting: Option<String>,
    pub lines_to_ignore: u64,
    /// Read the file from the client host (`LOAD DATA LOCAL`).
    pub local: bool,
}

impl Default for LoadDataOptions {
    fn default() -> Self {
        Self {
            field_terminator: ";".to_string(),
            field_enclosure: None,
            line_terminator: "\n".to_string(),
            line_starting: None,
            lines_to_ignore: 1,
            local: false,
        }
    }
}

impl LoadDataOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_terminator(mut self, value: impl Into<String>) -> Self {
        self.field_terminator = value.into();
        self
    }

    pub fn field_enclosure(mut self, value: impl Into<String>) -> Self {
        self.field_enclosure = Some(value.into());
        self
    }

    pub fn line_terminator(mut self, value: impl Into<String>) -> Self {
        self.line_terminator = value.into();
        self
    }

    pub fn line_starting(mut self, value: impl Into<String>) -> Self {
        self.line_starting = Some(value.into());
        self
    }

    pub fn lines_to_ignore(mut self, lines: u64) -> Self {
        self.lines_to_ignore = lines;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }
}

/// Options for [`Db::load_xml`](crate::Db::load_xml).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadXmlOptions {
    /// Element that delimits a row, e.g. `<user>`.
    pub row_tag: Option<String>,
    pub lines_to_ignore: u64,
}

impl LoadXmlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_tag(mut self, tag: impl Into<String>) -> Self {
        self.row_tag = Some(tag.into());
        self
    }

    pub fn lines_to_ignore(mut self, lines: u64) -> Self {
        self.lines_to_ignore = lines;
        self
    }
}

fn quoted_path(path: &Path) -> String {
    escape_string(&path.to_string_lossy())
}

pub(crate) fn load_data_sql(table: &str, path: &Path, options: &LoadDataOptions) -> String {
    let mut sql = format!(
        "LOAD DATA{} INFILE '{}' INTO TABLE {table}",
        if options.local { " LOCAL" } else { "" },
        quoted_path(path),
    );
    sql.push_str(&format!(
        " FIELDS TERMINATED BY '{}'",
        escape_string(&options.field_terminator)
    ));
    if let Some(enclosure) = &options.field_enclosure {
        sql.push_str(&format!(" ENCLOSED BY '{}'", escape_string(enclosure)));
    }
    sql.push_str(&format!(
        " LINES TERMINATED BY '{}'",
        escape_string(&options.line_terminator)
    ));
    if let Some(starting) = &options.line_starting {
        sql.push_str(&format!(" STARTING BY '{}'", escape_string(starting)));
    }
    sql.push_str(&format!(" IGNORE {} LINES", options.lines_to_ignore));
    sql
}

pub(crate) fn load_xml_sql(table: &str, path: &Path, options: &LoadXmlOptions) -> String {
    let mut sql = format!("LOAD XML INFILE '{}' INTO TABLE {table}", quoted_path(path));
    if let Some(tag) = &options.row_tag {
        sql.push_str(&format!(" ROWS IDENTIFIED BY '{}'", escape_string(tag)));
    }
    sql.push_str(&format!(" IGNORE {} LINES", options.lines_to_ignore));
    sql
}
