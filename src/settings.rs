use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::hierarchy::HierarchyOptions;
use crate::sql::{Dialect, SqlOptions, DEFAULT_BATCH_SIZE, DEFAULT_TABLE};

const DEFAULT_CONFIG: &str = "region.toml";

/// One published snapshot: `date` is `YYYY-MM`.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub date: String,
    pub url: String,
}

impl Source {
    fn new(date: &str, url: &str) -> Self {
        Source {
            date: date.to_string(),
            url: url.to_string(),
        }
    }

    pub fn month(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&format!("{}-01", self.date), "%Y-%m-%d")
            .with_context(|| format!("source date {:?} is not YYYY-MM", self.date))
    }

    /// `region_2017_08.sql` for date `2017-08`.
    pub fn file_name(&self) -> String {
        format!("region_{}.sql", self.date.replace('-', "_"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub table_name: String,
    pub batch_size: usize,
    pub dialect: Dialect,
    pub municipalities: Vec<String>,
    pub municipality_city_offset: u32,
    pub require_children: bool,
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub sources: Vec<Source>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            table_name: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            dialect: Dialect::default(),
            municipalities: HierarchyOptions::default()
                .municipalities
                .into_iter()
                .collect(),
            municipality_city_offset: 0,
            require_children: false,
            output_dir: PathBuf::from("data"),
            concurrency: 4,
            sources: vec![
                Source::new("2014-12", "http://files2.mca.gov.cn/cws/201502/20150225163817214.html"),
                Source::new("2015-12", "http://www.mca.gov.cn/article/sj/tjbz/a/2015/201706011127.html"),
                Source::new("2016-12", "http://www.mca.gov.cn/article/sj/tjbz/a/2016/201612/201705311652.html"),
                Source::new("2017-08", "http://www.mca.gov.cn/article/sj/tjbz/a/2017/20178/201709251028.html"),
                Source::new("2017-11", "http://www.mca.gov.cn/article/sj/tjbz/a/2017/201801/201801151447.html"),
            ],
        }
    }
}

impl Settings {
    /// Layer `region.toml` (or `path`) under `REGION_*` environment variables.
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("REGION"))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.table_name.trim().is_empty() {
            bail!("table_name must not be empty");
        }
        for source in &self.sources {
            source.month()?;
        }
        Ok(())
    }

    pub fn hierarchy_options(&self) -> HierarchyOptions {
        HierarchyOptions {
            municipalities: self.municipalities.iter().cloned().collect(),
            municipality_city_offset: self.municipality_city_offset,
            require_children: self.require_children,
        }
    }

    pub fn sql_options(&self) -> SqlOptions {
        SqlOptions {
            table: self.table_name.clone(),
            batch_size: self.batch_size,
            dialect: self.dialect,
        }
    }
}

// ── Tests ──
