/// Tabular report of unhealthy services
use std::fmt;

use crate::utils::polling::UnhealthyEntity;
use crate::Error;

const SERVICE_HEADER: &str = "Service";
const HEALTH_HEADER: &str = "Health";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub service: String,
    pub health: String,
}

/// Two-column `Service | Health` table, one row per unhealthy entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    rows: Vec<ReportRow>,
}

impl VerificationReport {
    pub fn from_unhealthy(entities: &[UnhealthyEntity]) -> Self {
        Self {
            rows: entities
                .iter()
                .map(|e| ReportRow {
                    service: e.id.clone(),
                    health: e.status.clone(),
                })
                .collect(),
        }
    }

    /// Report for the entities a readiness timeout carries, if it has any
    pub fn from_error(err: &Error) -> Option<Self> {
        let unhealthy = err.unhealthy();
        (!unhealthy.is_empty()).then(|| Self::from_unhealthy(unhealthy))
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.service.chars().count())
            .chain([SERVICE_HEADER.len()])
            .max()
            .unwrap_or_default();

        writeln!(f)?;
        writeln!(f, "{:<width$} | {}", SERVICE_HEADER, HEALTH_HEADER)?;
        writeln!(
            f,
            "{} | {}",
            "-".repeat(width),
            "-".repeat(HEALTH_HEADER.len())
        )?;
        for row in &self.rows {
            writeln!(f, "{:<width$} | {}", row.service, row.health)?;
        }

        Ok(())
    }
}
