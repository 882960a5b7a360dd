//! What opened the intersection view and what that adds to an export.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{Assessment, IntersectionEvent, Notification};
use crate::export::ExportCollector;

/// Record the view was opened from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceData {
    Notification(Notification),
    Event(IntersectionEvent),
    Assessment(Assessment),
    RsuIp(RsuInfo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsuInfo {
    pub ipv4_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_route: Option<String>,
}

/// Request for the host application to focus an RSU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsuSelection {
    pub rsu: RsuInfo,
}

/// Backend flavour the engine was built for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceApi {
    #[default]
    ConflictVisualizer,
    CvManager {
        /// RSU addresses known to publish MAP messages.
        map_rsu_ips: Vec<String>,
    },
}

impl SourceApi {
    /// Attach source-specific data to `export` after a full render.
    pub fn derive_additional_raw_data(
        &self,
        source: Option<&SourceData>,
        export: &mut ExportCollector,
    ) -> Option<RsuSelection> {
        match self {
            SourceApi::ConflictVisualizer => {
                match source {
                    Some(SourceData::Notification(notification)) => {
                        export.set_notification(notification.clone())
                    }
                    Some(SourceData::Event(event)) => export.set_event(event.clone()),
                    Some(SourceData::Assessment(assessment)) => {
                        export.set_assessment(assessment.clone())
                    }
                    Some(SourceData::RsuIp(_)) | None => {}
                }
                None
            }
            SourceApi::CvManager { map_rsu_ips } => {
                let Some(SourceData::RsuIp(rsu)) = source else {
                    return None;
                };
                if !map_rsu_ips.iter().any(|ip| ip == &rsu.ipv4_address) {
                    debug!(rsu = %rsu.ipv4_address, "source RSU has no MAP feed");
                    return None;
                }
                Some(RsuSelection { rsu: rsu.clone() })
            }
        }
    }
}
