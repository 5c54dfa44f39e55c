use serde::Deserialize;

use crate::parser::ids::FlatRecord;

pub const DEFAULT_TABLE: &str = "region";
pub const DEFAULT_BATCH_SIZE: usize = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Mysql,
    Sqlite,
}

impl Dialect {
    fn quote_ident(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Render `value` as a single-quoted string literal.
    fn quote_str(self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        match self {
            Dialect::Mysql => {
                for c in value.chars() {
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '\'' => out.push_str("\\'"),
                        '"' => out.push_str("\\\""),
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        '\x1a' => out.push_str("\\Z"),
                        c => out.push(c),
                    }
                }
            }
            Dialect::Sqlite => {
                // No escape sequences in SQLite literals; splice control chars.
                for c in value.chars() {
                    match c {
                        '\'' => out.push_str("''"),
                        c if c.is_control() => {
                            out.push_str(&format!("'||char({})||'", c as u32));
                        }
                        c => out.push(c),
                    }
                }
            }
        }
        out.push('\'');
        out
    }

    fn create_table(self, table: &str) -> String {
        let t = self.quote_ident(table);
        match self {
            Dialect::Mysql => format!(
                "CREATE TABLE IF NOT EXISTS {t} (\n    \
                 `id` SMALLINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,\n    \
                 `pid` SMALLINT UNSIGNED NOT NULL,\n    \
                 `code` MEDIUMINT UNSIGNED NOT NULL,\n    \
                 `name` VARCHAR(32) NOT NULL,\n    \
                 INDEX `pid` (`pid`)\n\
                 ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n\n"
            ),
            Dialect::Sqlite => {
                let index = self.quote_ident(&format!("{table}_pid"));
                format!(
                    "CREATE TABLE IF NOT EXISTS {t} (\n    \
                     \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                     \"pid\" INTEGER NOT NULL,\n    \
                     \"code\" INTEGER NOT NULL,\n    \
                     \"name\" VARCHAR(32) NOT NULL\n\
                     );\n\
                     CREATE INDEX IF NOT EXISTS {index} ON {t} (\"pid\");\n\n"
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlOptions {
    pub table: String,
    pub batch_size: usize,
    pub dialect: Dialect,
}

impl Default for SqlOptions {
    fn default() -> Self {
        SqlOptions {
            table: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            dialect: Dialect::default(),
        }
    }
}

/// Render the create statement plus one `INSERT` per `batch_size` rows.
pub fn render(rows: &[FlatRecord], opts: &SqlOptions) -> String {
    let d = opts.dialect;
    let mut sql = d.create_table(&opts.table);

    let header = format!(
        "INSERT INTO {} ({}, {}, {}, {}) VALUES\n",
        d.quote_ident(&opts.table),
        d.quote_ident("id"),
        d.quote_ident("pid"),
        d.quote_ident("code"),
        d.quote_ident("name"),
    );

    for batch in rows.chunks(opts.batch_size.max(1)) {
        sql.push_str(&header);
        let last = batch.len() - 1;
        for (i, row) in batch.iter().enumerate() {
            sql.push_str(&format!(
                "({},{},{},{})",
                row.id,
                row.pid,
                row.code,
                d.quote_str(&row.name)
            ));
            sql.push_str(if i == last { ";\n\n" } else { ",\n" });
        }
    }
    sql
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn rows(n: u32) -> Vec<FlatRecord> {
        (1..=n)
            .map(|i| FlatRecord {
                id: i,
                pid: i / 2,
                code: 110000 + i,
                name: format!("区{}", i),
            })
            .collect()
    }

    fn load_sqlite(sql: &str) -> Vec<FlatRecord> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(sql).unwrap();
        let mut stmt = conn
            .prepare("SELECT id, pid, code, name FROM region ORDER BY id")
            .unwrap();
        stmt.query_map([], |r| {
            Ok(FlatRecord {
                id: r.get(0)?,
                pid: r.get(1)?,
                code: r.get(2)?,
                name: r.get(3)?,
            })
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    }

    /// Read `(id,pid,code,'name')` rows back out of MySQL output.
    fn parse_mysql_rows(sql: &str) -> Vec<FlatRecord> {
        sql.lines()
            .filter(|l| l.starts_with('('))
            .map(|line| {
                let inner = line
                    .strip_suffix(',')
                    .or_else(|| line.strip_suffix(';'))
                    .unwrap()
                    .strip_prefix('(')
                    .unwrap()
                    .strip_suffix(')')
                    .unwrap();
                let mut parts = inner.splitn(4, ',');
                let mut num = || parts.next().unwrap().parse::<u32>().unwrap();
                let (id, pid, code) = (num(), num(), num());
                let literal = parts.next().unwrap();
                let body = literal.strip_prefix('\'').unwrap().strip_suffix('\'').unwrap();

                let mut name = String::new();
                let mut chars = body.chars();
                while let Some(c) = chars.next() {
                    if c != '\\' {
                        name.push(c);
                        continue;
                    }
                    name.push(match chars.next().unwrap() {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        'Z' => '\x1a',
                        other => other,
                    });
                }
                FlatRecord { id, pid, code, name }
            })
            .collect()
    }

    #[test]
    fn batch_boundary_at_2001_rows() {
        let sql = render(&rows(2001), &SqlOptions::default());
        let inserts: Vec<&str> = sql.split("INSERT INTO").skip(1).collect();
        assert_eq!(inserts.len(), 2);
        assert!(inserts[0].trim_end().ends_with("(2000,1000,112000,'区2000');"));
        assert!(inserts[0].contains("(1,0,110001,'区1'),\n"));
        assert!(inserts[1].contains("(2001,1000,112001,'区2001');"));
        assert_eq!(inserts[1].matches('(').count(), 2); // column list + one row
    }

    #[test]
    fn exact_multiple_of_batch_size_closes_each_statement() {
        let opts = SqlOptions {
            batch_size: 2,
            ..Default::default()
        };
        let sql = render(&rows(4), &opts);
        assert_eq!(sql.matches("INSERT INTO").count(), 2);
        assert_eq!(sql.matches(";\n\n").count(), 3); // create + two inserts
        assert!(sql.contains("(2,1,110002,'区2');\n\nINSERT INTO"));
    }

    #[test]
    fn mysql_schema_and_column_order() {
        let sql = render(&rows(1), &SqlOptions::default());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `region` ("));
        assert!(sql.contains("INDEX `pid` (`pid`)"));
        assert!(sql.contains("INSERT INTO `region` (`id`, `pid`, `code`, `name`) VALUES\n(1,0,110001,'区1');"));
    }

    #[test]
    fn empty_rows_render_schema_only() {
        let sql = render(&[], &SqlOptions::default());
        assert!(sql.contains("CREATE TABLE"));
        assert!(!sql.contains("INSERT"));
    }

    #[test]
    fn mysql_escapes_quotes_and_backslashes() {
        assert_eq!(Dialect::Mysql.quote_str("O'Brien\\x"), r"'O\'Brien\\x'");
        assert_eq!(Dialect::Mysql.quote_str("a\nb"), r"'a\nb'");
        assert_eq!(Dialect::Mysql.quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn mysql_round_trip_reproduces_rows() {
        let opts = SqlOptions {
            batch_size: 3,
            ..Default::default()
        };
        let mut input = rows(8);
        input[0].name = "O'Brien".to_string();
        input[2].name = r"C:\dir\".to_string();
        input[3].name = "two\nlines\r\tend".to_string();
        input[5].name = "sub\x1a\0nul, \"quoted\"".to_string();
        input[7].name = "'),(9,9,9,'x".to_string();
        let sql = render(&input, &opts);
        assert_eq!(sql.matches("INSERT INTO").count(), 3);
        assert_eq!(parse_mysql_rows(&sql), input);
    }

    #[test]
    fn sqlite_round_trip_reproduces_rows() {
        let opts = SqlOptions {
            batch_size: 3,
            dialect: Dialect::Sqlite,
            ..Default::default()
        };
        let mut input = rows(7);
        input[2].name = "it's".to_string();
        input[4].name = "tab\there\nline".to_string();
        let sql = render(&input, &opts);
        assert_eq!(sql.matches("INSERT INTO").count(), 3);
        assert_eq!(load_sqlite(&sql), input);
    }

    #[test]
    fn sqlite_custom_table_name() {
        let opts = SqlOptions {
            table: "area".to_string(),
            dialect: Dialect::Sqlite,
            ..Default::default()
        };
        let sql = render(&rows(2), &opts);
        assert!(sql.contains("CREATE INDEX IF NOT EXISTS \"area_pid\" ON \"area\" (\"pid\");"));
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&sql).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM area", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }
}
