//! Retrieval windows and the scan that selects archives for them.

use crate::archive_key::ArchiveKey;
use crate::error::{Error, Result};
use time::{Duration, OffsetDateTime};

/// A request for the archives of one prefix covering `[begin, end]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowRequest {
    prefix: String,
    begin: OffsetDateTime,
    end: OffsetDateTime,
}

impl WindowRequest {
    /// Build a window. The prefix must be non-empty and `begin <= end`.
    pub fn new(prefix: impl Into<String>, begin: OffsetDateTime, end: OffsetDateTime) -> Result<Self> {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::InvalidWindow("prefix must not be empty".to_string()));
        }
        if end < begin {
            return Err(Error::InvalidWindow(format!(
                "end time {end} is before begin time {begin}"
            )));
        }
        Ok(Self {
            prefix: trimmed.to_string(),
            begin,
            end,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn begin(&self) -> OffsetDateTime {
        self.begin
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.begin
    }

    /// Reject windows spanning more than `max_hours` whole hours.
    ///
    /// Only complete hours count, so a window of `max_hours` hours and 59 minutes
    /// is still accepted.
    pub fn ensure_span_within(&self, max_hours: u64) -> Result<()> {
        let hours = self.span().whole_hours().max(0) as u64;
        if hours > max_hours {
            return Err(Error::InvalidWindow(format!(
                "requested range of {hours} hours exceeds the maximum of {max_hours} hours"
            )));
        }
        Ok(())
    }

    /// A key with this timestamp opens the window.
    pub fn opens_at(&self, timestamp: OffsetDateTime) -> bool {
        timestamp > self.begin
    }

    /// Appending a key with this timestamp completes the selection.
    pub fn closes_at(&self, timestamp: OffsetDateTime) -> bool {
        timestamp > self.end
    }
}

/// State of the fold that turns an ordered key listing into a selection.
///
/// An archive named with time `t` holds log data up to roughly `t`, so the last
/// archive at or before `begin` and the first archive after `end` both belong to the
/// window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Window not yet open; `prior` is the latest key at or before `begin`.
    Seeking { prior: Option<ArchiveKey> },
    /// Window open; every further key is selected.
    Open { selected: Vec<ArchiveKey> },
    /// A key after `end` was selected; nothing more is taken.
    Closed { selected: Vec<ArchiveKey> },
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanState {
    pub fn new() -> Self {
        Self::Seeking { prior: None }
    }

    /// Fold one key (in ascending order) into the state.
    pub fn step(self, window: &WindowRequest, key: ArchiveKey) -> Self {
        match self {
            Self::Seeking { prior } => {
                if window.opens_at(key.timestamp()) {
                    let selected: Vec<ArchiveKey> = prior.into_iter().collect();
                    Self::admit(window, selected, key)
                } else {
                    Self::Seeking { prior: Some(key) }
                }
            }
            Self::Open { selected } => Self::admit(window, selected, key),
            closed @ Self::Closed { .. } => closed,
        }
    }

    fn admit(window: &WindowRequest, mut selected: Vec<ArchiveKey>, key: ArchiveKey) -> Self {
        let closes = window.closes_at(key.timestamp());
        selected.push(key);
        if closes {
            Self::Closed { selected }
        } else {
            Self::Open { selected }
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    /// Keys selected so far. Empty while still seeking.
    pub fn selected(&self) -> &[ArchiveKey] {
        match self {
            Self::Seeking { .. } => &[],
            Self::Open { selected } | Self::Closed { selected } => selected,
        }
    }

    pub fn into_selected(self) -> Vec<ArchiveKey> {
        match self {
            Self::Seeking { .. } => Vec::new(),
            Self::Open { selected } | Self::Closed { selected } => selected,
        }
    }
}

/// Fold an ascending sequence of keys, stopping as soon as the window closes.
pub fn select_window<I>(window: &WindowRequest, keys: I) -> Vec<ArchiveKey>
where
    I: IntoIterator<Item = ArchiveKey>,
{
    let mut state = ScanState::new();
    for key in keys {
        state = state.step(window, key);
        if state.is_closed() {
            break;
        }
    }
    state.into_selected()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive_key::KeyParser;
    use time::macros::datetime;

    fn keys(times: &[OffsetDateTime]) -> Vec<ArchiveKey> {
        let parser = KeyParser::default();
        times
            .iter()
            .map(|ts| parser.try_parse(&parser.object_key("dev1", *ts)).unwrap())
            .collect()
    }

    fn hours(selected: &[ArchiveKey]) -> Vec<u8> {
        selected.iter().map(|k| k.timestamp().hour()).collect()
    }

    fn window(begin: OffsetDateTime, end: OffsetDateTime) -> WindowRequest {
        WindowRequest::new("dev1", begin, end).unwrap()
    }

    #[test]
    fn selects_prior_inner_and_closing_keys() {
        let listing = keys(&[
            datetime!(2024-03-05 09:00 UTC),
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
            datetime!(2024-03-05 12:00 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 10:30 UTC),
            datetime!(2024-03-05 11:30 UTC),
        );
        assert_eq!(hours(&select_window(&w, listing)), vec![10, 11, 12]);
    }

    #[test]
    fn empty_listing_selects_nothing() {
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        assert!(select_window(&w, Vec::new()).is_empty());
    }

    #[test]
    fn window_that_never_opens_selects_nothing() {
        let listing = keys(&[
            datetime!(2024-03-05 08:00 UTC),
            datetime!(2024-03-05 09:00 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        assert!(select_window(&w, listing).is_empty());
    }

    #[test]
    fn first_key_after_begin_opens_without_prior() {
        let listing = keys(&[
            datetime!(2024-03-05 10:10 UTC),
            datetime!(2024-03-05 10:20 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        let selected = select_window(&w, listing);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].timestamp(), datetime!(2024-03-05 10:10 UTC));
    }

    #[test]
    fn window_that_never_closes_takes_everything_after_opening() {
        let listing = keys(&[
            datetime!(2024-03-05 09:00 UTC),
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 10:45 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 09:30 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        assert_eq!(hours(&select_window(&w, listing)), vec![9, 10, 10]);
    }

    #[test]
    fn boundary_timestamps_are_exclusive() {
        // A key exactly at begin is still a prior candidate; one exactly at end
        // does not close the window.
        let listing = keys(&[
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
            datetime!(2024-03-05 12:00 UTC),
            datetime!(2024-03-05 13:00 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 12:00 UTC),
        );
        assert_eq!(hours(&select_window(&w, listing)), vec![10, 11, 12, 13]);
    }

    #[test]
    fn window_between_two_keys_selects_both() {
        let listing = keys(&[
            datetime!(2024-03-05 09:00 UTC),
            datetime!(2024-03-05 12:00 UTC),
            datetime!(2024-03-05 13:00 UTC),
        ]);
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        assert_eq!(hours(&select_window(&w, listing)), vec![9, 12]);
    }

    #[test]
    fn closed_state_ignores_further_keys() {
        let w = window(
            datetime!(2024-03-05 10:00 UTC),
            datetime!(2024-03-05 11:00 UTC),
        );
        let mut listing = keys(&[
            datetime!(2024-03-05 12:00 UTC),
            datetime!(2024-03-05 13:00 UTC),
        ])
        .into_iter();
        let state = ScanState::new().step(&w, listing.next().unwrap());
        assert!(state.is_closed());
        let state = state.step(&w, listing.next().unwrap());
        assert_eq!(state.selected().len(), 1);
    }

    #[test]
    fn rejects_inverted_and_empty_windows() {
        assert!(
            WindowRequest::new(
                "dev1",
                datetime!(2024-03-05 11:00 UTC),
                datetime!(2024-03-05 10:00 UTC)
            )
            .is_err()
        );
        assert!(
            WindowRequest::new(
                "/",
                datetime!(2024-03-05 10:00 UTC),
                datetime!(2024-03-05 11:00 UTC)
            )
            .is_err()
        );
    }

    #[test]
    fn span_limit_counts_whole_hours() {
        let begin = datetime!(2024-03-05 00:00 UTC);
        let ok = WindowRequest::new("dev1", begin, begin + Duration::minutes(14 * 60 + 59)).unwrap();
        assert!(ok.ensure_span_within(14).is_ok());
        let too_long = WindowRequest::new("dev1", begin, begin + Duration::hours(15)).unwrap();
        assert!(too_long.ensure_span_within(14).is_err());
    }
}
