use crate::http::http2::frames::settings::*;
use crate::http::http2::frames::ErrorCode;
use crate::http::{Error, Result};
use tracing::debug;

pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_MAX_FRAME_SIZE: u32 = (1 << 24) - 1;
pub const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;
pub const DEFAULT_MAX_HEADER_LIST_SIZE: u32 = 0x40_0000;

/// One side's SETTINGS parameters. A connection keeps two: the values it
/// advertised (owner) and the values the peer advertised (peer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StreamSettings {
    pub header_table_size: u32,
    pub enable_push: bool,
    /// `None` is unlimited.
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: DEFAULT_MAX_HEADER_LIST_SIZE,
        }
    }
}

impl StreamSettings {
    /// Checks a single item against the RFC 9113 §6.5.2 bounds.
    pub fn check(setting: &Setting) -> Result<()> {
        let valid = match setting.identifier {
            SETTINGS_ENABLE_PUSH => setting.value <= 1,
            SETTINGS_INITIAL_WINDOW_SIZE => setting.value <= MAX_WINDOW_SIZE,
            SETTINGS_MAX_FRAME_SIZE => {
                (DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&setting.value)
            }
            _ => true,
        };
        match valid {
            true => Ok(()),
            false => Err(Error::protocol(
                ErrorCode::ProtocolError,
                &format!("invalid setting {setting}"),
            )),
        }
    }

    fn update_setting(&mut self, setting: Setting) {
        match setting.identifier {
            SETTINGS_HEADER_TABLE_SIZE => self.header_table_size = setting.value,
            SETTINGS_ENABLE_PUSH => self.enable_push = setting.value != 0,
            SETTINGS_INITIAL_WINDOW_SIZE => self.initial_window_size = setting.value,
            SETTINGS_MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = Some(setting.value),
            SETTINGS_MAX_FRAME_SIZE => self.max_frame_size = setting.value,
            SETTINGS_MAX_HEADER_LIST_SIZE => self.max_header_list_size = setting.value,
            _ => debug!(%setting, "ignoring unknown setting"),
        }
    }

    /// Validates every item first, then applies them in order. Returns the
    /// change in `initial_window_size`, which the caller applies to open streams.
    pub fn apply(&mut self, settings: &[Setting]) -> Result<i64> {
        settings.iter().try_for_each(Self::check)?;
        let before = self.initial_window_size as i64;
        for setting in settings {
            self.update_setting(*setting);
        }

        Ok(self.initial_window_size as i64 - before)
    }

    /// Items that differ from the protocol defaults, suitable for a SETTINGS frame.
    pub fn to_items(&self) -> Vec<Setting> {
        let mut items = Vec::with_capacity(6);
        if self.header_table_size != DEFAULT_HEADER_TABLE_SIZE {
            items.push(Setting::new(SETTINGS_HEADER_TABLE_SIZE, self.header_table_size));
        }
        // push defaults to enabled on the wire
        items.push(Setting::new(SETTINGS_ENABLE_PUSH, self.enable_push as u32));
        if let Some(max) = self.max_concurrent_streams {
            items.push(Setting::new(SETTINGS_MAX_CONCURRENT_STREAMS, max));
        }
        if self.initial_window_size != DEFAULT_INITIAL_WINDOW_SIZE {
            items.push(Setting::new(
                SETTINGS_INITIAL_WINDOW_SIZE,
                self.initial_window_size,
            ));
        }
        if self.max_frame_size != DEFAULT_MAX_FRAME_SIZE {
            items.push(Setting::new(SETTINGS_MAX_FRAME_SIZE, self.max_frame_size));
        }
        items.push(Setting::new(
            SETTINGS_MAX_HEADER_LIST_SIZE,
            self.max_header_list_size,
        ));

        items
    }

    /// Settings assumed for a peer before its first SETTINGS frame arrives.
    pub fn protocol_defaults() -> Self {
        Self {
            enable_push: true,
            max_header_list_size: u32::MAX,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_items().iter().try_for_each(Self::check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = StreamSettings::default();
        assert_eq!(settings.header_table_size, 4096);
        assert!(!settings.enable_push);
        assert_eq!(settings.max_concurrent_streams, None);
        assert_eq!(settings.initial_window_size, 65_535);
        assert_eq!(settings.max_frame_size, 16_384);
        assert_eq!(settings.max_header_list_size, 0x40_0000);
    }

    #[test]
    fn apply_reports_window_delta() {
        let mut settings = StreamSettings::default();
        let delta = settings
            .apply(&[
                Setting::new(SETTINGS_INITIAL_WINDOW_SIZE, 65_535 + 1000),
                Setting::new(SETTINGS_MAX_CONCURRENT_STREAMS, 10),
            ])
            .unwrap();
        assert_eq!(delta, 1000);
        assert_eq!(settings.max_concurrent_streams, Some(10));

        let delta = settings
            .apply(&[Setting::new(SETTINGS_INITIAL_WINDOW_SIZE, 0)])
            .unwrap();
        assert_eq!(delta, -(65_535 + 1000));
    }

    #[test]
    fn out_of_range_values_are_rejected_without_partial_update() {
        let bad = [
            Setting::new(SETTINGS_MAX_FRAME_SIZE, 16_383),
            Setting::new(SETTINGS_MAX_FRAME_SIZE, 1 << 24),
            Setting::new(SETTINGS_ENABLE_PUSH, 2),
            Setting::new(SETTINGS_INITIAL_WINDOW_SIZE, 1 << 31),
        ];
        for setting in bad {
            let mut settings = StreamSettings::default();
            let err = settings
                .apply(&[Setting::new(SETTINGS_HEADER_TABLE_SIZE, 1), setting])
                .unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::ProtocolError));
            assert_eq!(settings, StreamSettings::default());
        }
    }

    #[test]
    fn unknown_settings_are_ignored() {
        let mut settings = StreamSettings::default();
        assert_eq!(settings.apply(&[Setting::new(0x99, 7)]).unwrap(), 0);
        assert_eq!(settings, StreamSettings::default());
    }

    #[test]
    fn items_round_trip_through_apply() {
        let owner = StreamSettings {
            initial_window_size: 4_194_304,
            max_header_list_size: 10_485_760,
            max_concurrent_streams: Some(100),
            ..StreamSettings::default()
        };
        let mut peer_view = StreamSettings::protocol_defaults();
        peer_view.apply(&owner.to_items()).unwrap();
        assert_eq!(peer_view, owner);
    }
}
