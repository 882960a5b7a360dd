//! Raw payload cache and the zip archive format used to share a session.
//!
//! Archive layout, one JSON document per category:
//! `intersection_{id}_{MAP|SPAT|BSM|Event|Assessment|Notification}_data.json`.
//! The optional side-channel documents are only written when present.

use std::io::{Cursor, Read, Write};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::core::{
    Assessment, FusionError, FusionResult, IntersectionEvent, Notification, OdeBsmData,
    ProcessedMap, ProcessedSpat, parse_epoch_millis,
};

const MAP_SUFFIX: &str = "_MAP_data.json";
const SPAT_SUFFIX: &str = "_SPAT_data.json";
const BSM_SUFFIX: &str = "_BSM_data.json";
const EVENT_SUFFIX: &str = "_Event_data.json";
const ASSESSMENT_SUFFIX: &str = "_Assessment_data.json";
const NOTIFICATION_SUFFIX: &str = "_Notification_data.json";

/// Latest raw payload per category. Every setter replaces the previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportCollector {
    map: Vec<ProcessedMap>,
    spat: Vec<ProcessedSpat>,
    bsm: Vec<OdeBsmData>,
    event: Option<IntersectionEvent>,
    assessment: Option<Assessment>,
    notification: Option<Notification>,
}

impl ExportCollector {
    pub fn set_map(&mut self, map: Vec<ProcessedMap>) {
        self.map = map;
    }

    pub fn set_spat(&mut self, spat: Vec<ProcessedSpat>) {
        self.spat = spat;
    }

    pub fn set_bsm(&mut self, bsm: Vec<OdeBsmData>) {
        self.bsm = bsm;
    }

    pub fn set_event(&mut self, event: IntersectionEvent) {
        self.event = Some(event);
    }

    pub fn set_assessment(&mut self, assessment: Assessment) {
        self.assessment = Some(assessment);
    }

    pub fn set_notification(&mut self, notification: Notification) {
        self.notification = Some(notification);
    }

    pub fn map(&self) -> &[ProcessedMap] {
        &self.map
    }

    pub fn spat(&self) -> &[ProcessedSpat] {
        &self.spat
    }

    pub fn bsm(&self) -> &[OdeBsmData] {
        &self.bsm
    }

    pub fn event(&self) -> Option<&IntersectionEvent> {
        self.event.as_ref()
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        self.assessment.as_ref()
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
            && self.spat.is_empty()
            && self.bsm.is_empty()
            && self.event.is_none()
            && self.assessment.is_none()
            && self.notification.is_none()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Build the zip archive for `intersection_id`; `None` when nothing has been collected.
    pub fn write_archive(&self, intersection_id: i64) -> FusionResult<Option<ExportArchive>> {
        if self.is_empty() {
            debug!(intersection_id, "export skipped, collector is empty");
            return Ok(None);
        }

        let prefix = format!("intersection_{intersection_id}");
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        write_entry(&mut zip, format!("{prefix}{MAP_SUFFIX}"), &self.map)?;
        write_entry(&mut zip, format!("{prefix}{SPAT_SUFFIX}"), &self.spat)?;
        write_entry(&mut zip, format!("{prefix}{BSM_SUFFIX}"), &self.bsm)?;
        if let Some(event) = &self.event {
            write_entry(&mut zip, format!("{prefix}{EVENT_SUFFIX}"), event)?;
        }
        if let Some(assessment) = &self.assessment {
            write_entry(&mut zip, format!("{prefix}{ASSESSMENT_SUFFIX}"), assessment)?;
        }
        if let Some(notification) = &self.notification {
            write_entry(
                &mut zip,
                format!("{prefix}{NOTIFICATION_SUFFIX}"),
                notification,
            )?;
        }

        let bytes = zip.finish()?.into_inner();
        debug!(
            intersection_id,
            map = self.map.len(),
            spat = self.spat.len(),
            bsm = self.bsm.len(),
            bytes = bytes.len(),
            "export archive written"
        );
        Ok(Some(ExportArchive {
            file_name: format!("{prefix}_data.zip"),
            bytes,
        }))
    }
}

fn write_entry<T: Serialize + ?Sized>(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: String,
    value: &T,
) -> FusionResult<()> {
    let json = sonic_rs::to_vec(value).map_err(|err| FusionError::Archive(err.to_string()))?;
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name, options)?;
    zip.write_all(&json)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArchive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Contents of a previously exported archive, ready for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMessageData {
    pub map_data: Vec<ProcessedMap>,
    pub spat_data: Vec<ProcessedSpat>,
    pub bsm_data: Vec<OdeBsmData>,
    pub event_data: Option<IntersectionEvent>,
    pub assessment_data: Option<Assessment>,
    pub notification_data: Option<Notification>,
}

/// Parse an archive produced by [`ExportCollector::write_archive`].
///
/// MAP and SPAT documents are required; everything else is optional. Entries are
/// matched by suffix so a renamed archive still imports.
pub fn read_archive(bytes: &[u8]) -> FusionResult<ImportedMessageData> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut map_data = None;
    let mut spat_data = None;
    let mut bsm_data = Vec::new();
    let mut event_data = None;
    let mut assessment_data = None;
    let mut notification_data = None;

    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        let name = entry.name().to_string();
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;

        if name.ends_with(MAP_SUFFIX) {
            let mut maps: Vec<ProcessedMap> = decode_entry(&name, &buf)?;
            for map in &mut maps {
                map.index_time()?;
            }
            map_data = Some(maps);
        } else if name.ends_with(SPAT_SUFFIX) {
            let mut spats: Vec<ProcessedSpat> = decode_entry(&name, &buf)?;
            for spat in &mut spats {
                spat.index_time()?;
            }
            spat_data = Some(spats);
        } else if name.ends_with(BSM_SUFFIX) {
            let bsms: Vec<OdeBsmData> = decode_entry(&name, &buf)?;
            for bsm in &bsms {
                parse_epoch_millis(&bsm.metadata.ode_received_at)?;
            }
            bsm_data = bsms;
        } else if name.ends_with(EVENT_SUFFIX) {
            event_data = Some(decode_entry(&name, &buf)?);
        } else if name.ends_with(ASSESSMENT_SUFFIX) {
            assessment_data = Some(decode_entry(&name, &buf)?);
        } else if name.ends_with(NOTIFICATION_SUFFIX) {
            notification_data = Some(decode_entry(&name, &buf)?);
        } else {
            warn!(entry = %name, "ignoring unknown archive entry");
        }
    }

    let map_data = map_data
        .filter(|maps| !maps.is_empty())
        .ok_or_else(|| FusionError::Archive("archive has no MAP data".to_string()))?;
    let spat_data = spat_data
        .filter(|spats| !spats.is_empty())
        .ok_or_else(|| FusionError::Archive("archive has no SPAT data".to_string()))?;

    Ok(ImportedMessageData {
        map_data,
        spat_data,
        bsm_data,
        event_data,
        assessment_data,
        notification_data,
    })
}

fn decode_entry<T: DeserializeOwned>(name: &str, buf: &[u8]) -> FusionResult<T> {
    sonic_rs::from_slice(buf).map_err(|err| FusionError::Archive(format!("{name}: {err}")))
}
