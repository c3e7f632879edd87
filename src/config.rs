//! Run configuration, loaded from TOML.
//!
//! Every key is optional; missing keys fall back to the default layout under `./data`.
//!
//! ```toml
//! [source]
//! workbook = "./data/raw/global_superstore_2016.xlsx"
//! orders_sheet = "Orders"
//!
//! [output]
//! csv_path = "./data/processed/cleaned_orders.csv"
//! parquet_path = "./data/processed/cleaned_orders.parquet"
//! quality_report = "./data/processed/quality_report.json"
//!
//! [warehouse]
//! dir = "./data/warehouse"
//! reports_dir = "./data/processed"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, PipelineResult};
use crate::ingestion::{LoadOptions, SheetNames};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub warehouse: WarehouseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub workbook: PathBuf,
    pub orders_sheet: String,
    pub returns_sheet: String,
    pub people_sheet: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let sheets = SheetNames::default();
        Self {
            workbook: PathBuf::from("./data/raw/global_superstore_2016.xlsx"),
            orders_sheet: sheets.orders,
            returns_sheet: sheets.returns,
            people_sheet: sheets.people,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub parquet_path: PathBuf,
    /// Where to write the JSON quality report; not written when unset.
    pub quality_report: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("./data/processed/cleaned_orders.csv"),
            parquet_path: PathBuf::from("./data/processed/cleaned_orders.parquet"),
            quality_report: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseConfig {
    /// Directory holding one Parquet file per warehouse table.
    pub dir: PathBuf,
    /// Directory the BI extracts are written to.
    pub reports_dir: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/warehouse"),
            reports_dir: PathBuf::from("./data/processed"),
        }
    }
}

impl PipelineConfig {
    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| PipelineError::Config {
            message: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// Loader options for the configured sheet names, with the default order hints.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            sheets: SheetNames {
                orders: self.source.orders_sheet.clone(),
                returns: self.source.returns_sheet.clone(),
                people: self.source.people_sheet.clone(),
            },
            ..LoadOptions::default()
        }
    }

    fn validate(&self) -> PipelineResult<()> {
        let sheets = [
            ("source.orders_sheet", &self.source.orders_sheet),
            ("source.returns_sheet", &self.source.returns_sheet),
            ("source.people_sheet", &self.source.people_sheet),
        ];
        if let Some((key, _)) = sheets.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(PipelineError::Config {
                message: format!("{key} must not be empty"),
            });
        }
        if self.output.csv_path == self.output.parquet_path {
            return Err(PipelineError::Config {
                message: "output.csv_path and output.parquet_path must differ".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_default_layout() {
        let cfg = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, PipelineConfig::default());
        assert_eq!(
            cfg.source.workbook,
            PathBuf::from("./data/raw/global_superstore_2016.xlsx")
        );
        assert_eq!(cfg.source.orders_sheet, "Orders");
        assert_eq!(cfg.warehouse.dir, PathBuf::from("./data/warehouse"));
        assert!(cfg.output.quality_report.is_none());
    }

    #[test]
    fn partial_sections_override_only_given_keys() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [source]
            workbook = "in.xlsx"

            [output]
            quality_report = "out/report.json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.source.workbook, PathBuf::from("in.xlsx"));
        assert_eq!(cfg.source.people_sheet, "People");
        assert_eq!(cfg.output.quality_report, Some(PathBuf::from("out/report.json")));
        assert_eq!(
            cfg.output.csv_path,
            PathBuf::from("./data/processed/cleaned_orders.csv")
        );
        assert_eq!(cfg.load_options().sheets.orders, "Orders");
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = PipelineConfig::from_toml_str("[source]\norders_sheet = \" \"\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));

        let err = PipelineConfig::from_toml_str("[source]\nunknown = 1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Toml(_)));
    }
}
