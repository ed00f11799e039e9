// SPDX-License-Identifier: Apache-2.0

#[derive(Debug)]
pub struct DepschedError(pub String);

impl std::fmt::Display for DepschedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "depsched error: {}", self.0)
    }
}

impl std::error::Error for DepschedError {}

impl From<serde_json::Error> for DepschedError {
    fn from(e: serde_json::Error) -> Self {
        DepschedError(format!("JSON: {}", e))
    }
}

impl From<toml::de::Error> for DepschedError {
    fn from(e: toml::de::Error) -> Self {
        DepschedError(format!("TOML: {}", e))
    }
}
