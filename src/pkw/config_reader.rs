use crate::pkw::*;

use serde::{Deserialize, Serialize};

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(rename = "protocolsPath")]
    pub protocols_path: String,
    #[serde(rename = "wardsPath")]
    pub wards_path: Option<String>,
    #[serde(rename = "wardsProvider")]
    pub wards_provider: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl StorageSettings {
    /// The explicit provider, or the one guessed from the file extension.
    pub fn wards_provider(&self) -> Option<String> {
        if let Some(p) = self.wards_provider.clone() {
            return Some(p);
        }
        let path = self.wards_path.clone()?;
        Path::new(path.as_str())
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RulesSettings {
    #[serde(rename = "selectionMode")]
    pub selection_mode: Option<String>,
}

impl RulesSettings {
    pub fn counting_rules(&self) -> PkwResult<CountingRules> {
        let selection_mode = match self.selection_mode.as_deref() {
            None | Some("approvalsFirst") => SelectionMode::ApprovalsFirst,
            Some("latestFirst") => SelectionMode::LatestFirst,
            Some(x) => whatever!("unknown selection mode: {}", x),
        };
        Ok(CountingRules { selection_mode })
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct GeoSettings {
    pub radius: Option<f64>,
    #[serde(rename = "minCount")]
    pub min_count: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    #[serde(rename = "maxAttempts")]
    pub max_attempts: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(rename = "cloudName")]
    pub cloud_name: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "apiSecret")]
    pub api_secret: String,
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
}

impl ImageSettings {
    pub const DEFAULT_BASE_URL: &'static str = "http://res.cloudinary.com";

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| ImageSettings::DEFAULT_BASE_URL.to_string())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PkwConfig {
    pub storage: StorageSettings,
    pub rules: Option<RulesSettings>,
    pub geo: Option<GeoSettings>,
    pub verification: Option<VerificationSettings>,
    pub images: Option<ImageSettings>,
}

pub const DEFAULT_RADIUS: f64 = 1000.0;
pub const DEFAULT_MIN_COUNT: usize = 1;
pub const DEFAULT_PENDING_COUNT: usize = 5;

impl PkwConfig {
    pub fn counting_rules(&self) -> PkwResult<CountingRules> {
        match &self.rules {
            Some(r) => r.counting_rules(),
            None => Ok(CountingRules::DEFAULT_RULES),
        }
    }

    pub fn radius(&self) -> f64 {
        self.geo
            .as_ref()
            .and_then(|g| g.radius)
            .unwrap_or(DEFAULT_RADIUS)
    }

    pub fn min_count(&self) -> usize {
        self.geo
            .as_ref()
            .and_then(|g| g.min_count)
            .unwrap_or(DEFAULT_MIN_COUNT)
    }

    pub fn verifier(&self) -> PkwResult<Verifier> {
        match self.verification.as_ref().and_then(|v| v.max_attempts) {
            Some(n) => Verifier::new(n).context(CountingSnafu {}),
            None => Ok(Verifier::DEFAULT),
        }
    }
}

pub fn read_config(path: &str) -> PkwResult<PkwConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: PkwConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}
