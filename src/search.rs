//! Search and export orchestration.
//!
//! A [`SearchSession`] turns the live filter state into tagged measurement
//! requests and remembers the query behind the results on screen, so the
//! host can tell when those results no longer match the filters.

use tracing::{debug, info, warn};

use crate::error::{FetchError, SearchError};
use crate::filters::FilterState;
use crate::hex::round1;
use crate::model::{AggregatedPoint, SearchSummary};
use crate::query::{flatten, ExportFormat, FlatQuery};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasurementKind {
    Summary,
    Hexbins,
    Export(ExportFormat),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementRequest {
    pub tag: u64,
    pub kind: MeasurementKind,
    pub query: FlatQuery,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MeasurementPayload {
    Summary(SearchSummary),
    Hexbins(Vec<AggregatedPoint>),
    Export(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct MeasurementReply {
    pub tag: u64,
    pub result: Result<MeasurementPayload, FetchError>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
    /// Stale or unexpected reply, dropped.
    Ignored,
    Summary,
    Hexbins,
    Exported { format: ExportFormat, bytes: Vec<u8> },
    Failed(SearchError),
}

#[derive(Debug, Default)]
pub struct SearchSession {
    format: ExportFormat,
    next_tag: u64,
    pending_search: Option<(u64, FlatQuery)>,
    pending_hexbins: Option<u64>,
    pending_export: Option<(u64, ExportFormat)>,
    last_applied: Option<FlatQuery>,
    summary: Option<SearchSummary>,
    points: Vec<AggregatedPoint>,
    last_error: Option<SearchError>,
}

impl SearchSession {
    pub fn new(format: ExportFormat) -> Self {
        let format = if format.is_downloadable() {
            format
        } else {
            ExportFormat::default()
        };
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    pub fn cycle_format(&mut self) -> ExportFormat {
        self.format = self.format.next();
        self.format
    }

    pub fn last_applied(&self) -> Option<&FlatQuery> {
        self.last_applied.as_ref()
    }

    pub fn summary(&self) -> Option<&SearchSummary> {
        self.summary.as_ref()
    }

    pub fn points(&self) -> &[AggregatedPoint] {
        &self.points
    }

    pub fn last_error(&self) -> Option<&SearchError> {
        self.last_error.as_ref()
    }

    pub fn is_searching(&self) -> bool {
        self.pending_search.is_some()
    }

    pub fn is_exporting(&self) -> bool {
        self.pending_export.is_some()
    }

    /// True when the displayed results were produced by different filters.
    pub fn filters_out_of_sync(&self, state: &FilterState) -> bool {
        match &self.last_applied {
            Some(applied) => {
                let format = applied.format().unwrap_or(self.format);
                flatten(state, format) != *applied
            }
            None => true,
        }
    }

    /// Validates and flattens the filters into a summary request. A newer
    /// search supersedes any reply still in flight.
    pub fn search(&mut self, state: &FilterState) -> Result<MeasurementRequest, SearchError> {
        if let Err(err) = state.validate() {
            debug!("search rejected: {err}");
            return Err(err.into());
        }
        let query = flatten(state, self.format);
        let tag = self.issue_tag();
        self.pending_search = Some((tag, query.clone()));
        info!("search issued tag={tag} keys={}", query.len());
        Ok(MeasurementRequest {
            tag,
            kind: MeasurementKind::Summary,
            query,
        })
    }

    /// Map points for the applied filters.
    pub fn fetch_hexbins(&mut self) -> Result<MeasurementRequest, SearchError> {
        let applied = self.last_applied.as_ref().ok_or(SearchError::NoPriorSearch)?;
        let query = applied.with_format(ExportFormat::MapFormat);
        let tag = self.issue_tag();
        self.pending_hexbins = Some(tag);
        debug!("hexbin fetch issued tag={tag}");
        Ok(MeasurementRequest {
            tag,
            kind: MeasurementKind::Hexbins,
            query,
        })
    }

    /// Re-sends the applied query with `format` swapped in.
    pub fn export_download(&mut self, format: ExportFormat) -> Result<MeasurementRequest, SearchError> {
        let applied = self.last_applied.as_ref().ok_or(SearchError::NoPriorSearch)?;
        let query = applied.with_format(format);
        let tag = self.issue_tag();
        self.pending_export = Some((tag, format));
        info!("export issued tag={tag} format={}", format.as_str());
        Ok(MeasurementRequest {
            tag,
            kind: MeasurementKind::Export(format),
            query,
        })
    }

    pub fn apply_reply(&mut self, reply: MeasurementReply) -> SearchOutcome {
        let tag = reply.tag;
        if let Some((pending, query)) = self.pending_search.take() {
            if pending == tag {
                return match reply.result {
                    Ok(MeasurementPayload::Summary(summary)) => {
                        debug!("search reply tag={tag} count={:?}", summary.count);
                        self.last_applied = Some(query);
                        self.summary = Some(summary);
                        self.points.clear();
                        self.last_error = None;
                        SearchOutcome::Summary
                    }
                    Ok(_) => self.fail(tag, FetchError::Transport("unexpected payload".to_string())),
                    Err(err) => self.fail(tag, err),
                };
            }
            self.pending_search = Some((pending, query));
        }
        if self.pending_hexbins == Some(tag) {
            self.pending_hexbins = None;
            return match reply.result {
                Ok(MeasurementPayload::Hexbins(points)) => {
                    debug!("hexbin reply tag={tag} points={}", points.len());
                    self.points = points;
                    self.last_error = None;
                    SearchOutcome::Hexbins
                }
                Ok(_) => self.fail(tag, FetchError::Transport("unexpected payload".to_string())),
                Err(err) => self.fail(tag, err),
            };
        }
        if let Some((pending, format)) = self.pending_export {
            if pending == tag {
                self.pending_export = None;
                return match reply.result {
                    Ok(MeasurementPayload::Export(bytes)) => {
                        if let Some(applied) = self.last_applied.as_mut() {
                            *applied = applied.with_format(format);
                        }
                        self.format = format;
                        self.last_error = None;
                        SearchOutcome::Exported { format, bytes }
                    }
                    Ok(_) => self.fail(tag, FetchError::Transport("unexpected payload".to_string())),
                    Err(err) => self.fail(tag, err),
                };
            }
        }
        debug!("dropping stale measurement reply tag={tag}");
        SearchOutcome::Ignored
    }

    /// One-line result summary with the average rounded to one decimal.
    pub fn summary_text(&self) -> Option<String> {
        let summary = self.summary.as_ref()?;
        let count = summary.count.unwrap_or(0);
        Some(match summary.avg_temp {
            Some(avg) => format!("{count} measurements, average {:.1}°C", round1(avg)),
            None => format!("{count} measurements"),
        })
    }

    fn fail(&mut self, tag: u64, err: FetchError) -> SearchOutcome {
        let err = SearchError::from(err);
        warn!("measurement request tag={tag} failed: {err}");
        self.last_error = Some(err.clone());
        SearchOutcome::Failed(err)
    }

    fn issue_tag(&mut self) -> u64 {
        self.next_tag += 1;
        self.next_tag
    }
}
