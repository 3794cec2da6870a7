use std::path::Path;

use thiserror::Error;

use crate::{history::WeatherHistory, types::Quantity};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to open report template {path}: {reason}")]
    TemplateUnavailable { path: String, reason: String },
    #[error("report template {path} is empty")]
    EmptyTemplate { path: String },
}

#[derive(Debug, Clone)]
pub struct ReportTemplate {
    html: String,
}

impl ReportTemplate {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn from_contents(path: &str, html: String) -> Result<Self, ReportError> {
        if html.trim().is_empty() {
            return Err(ReportError::EmptyTemplate {
                path: path.to_string(),
            });
        }
        Ok(Self::new(html))
    }

    pub fn missing_placeholders(&self) -> Vec<&'static str> {
        placeholders()
            .filter(|token| !self.html.contains(token))
            .collect()
    }

    // Values are inserted as-is, without escaping.
    pub fn render(&self, history: &WeatherHistory) -> String {
        let mut html = self.html.clone();
        for quantity in Quantity::ALL {
            let lists = history.series(quantity).label_value_lists();
            html = html.replace(quantity.labels_token(), &lists.labels);
            html = html.replace(quantity.data_token(), &lists.values);
        }
        html
    }
}

pub fn placeholders() -> impl Iterator<Item = &'static str> {
    Quantity::ALL
        .into_iter()
        .flat_map(|quantity| [quantity.labels_token(), quantity.data_token()])
}

pub fn load_template(path: impl AsRef<Path>) -> Result<ReportTemplate, ReportError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let html = std::fs::read_to_string(path).map_err(|err| ReportError::TemplateUnavailable {
        path: display.clone(),
        reason: err.to_string(),
    })?;
    ReportTemplate::from_contents(&display, html)
}
