use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::locations::{LocationIndex, LocationReply, LocationRequest};
use crate::model::{location_index, AggregatedPoint, LocationDirectory, PresetList, SearchSummary, SessionInfo};
use crate::presets::{Preset, PresetReply, PresetRequest};
use crate::query::FlatQuery;
use crate::search::{MeasurementKind, MeasurementPayload, MeasurementReply, MeasurementRequest};
use crate::session::SessionReply;

pub const LOCATIONS_PATH: &str = "/api/locations/";
pub const PRESETS_PATH: &str = "/api/presets/";
pub const SEARCH_PATH: &str = "/api/measurements/search/";
pub const SESSION_PATH: &str = "/api/session/";

#[derive(Clone, Debug)]
pub enum ApiRequest {
    Locations(LocationRequest),
    Presets(PresetRequest),
    Session,
    Measurements(MeasurementRequest),
}

#[derive(Clone, Debug)]
pub enum ApiReply {
    Locations(LocationReply),
    Presets(PresetReply),
    Session(SessionReply),
    Measurements(MeasurementReply),
}

#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub insecure: bool,
}

/// Serves requests one at a time until the request channel closes.
pub fn spawn_api_worker(
    name: &'static str,
    settings: ApiSettings,
    tx: Sender<ApiReply>,
    rx: Receiver<ApiRequest>,
) {
    thread::spawn(move || {
        info!("{name} worker started");
        let client = match Client::builder()
            .danger_accept_invalid_certs(settings.insecure)
            .timeout(settings.timeout)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                error!("{name} client error: {err}");
                // Answer every request so loaders leave their loading state.
                let message = format!("Client error: {err}");
                while let Ok(request) = rx.recv() {
                    let reply = failed_reply(request, FetchError::Transport(message.clone()));
                    if tx.send(reply).is_err() {
                        break;
                    }
                }
                return;
            }
        };

        while let Ok(request) = rx.recv() {
            let reply = serve(&client, &settings.base_url, request);
            if tx.send(reply).is_err() {
                debug!("receiver dropped, exiting {name} worker");
                break;
            }
        }
        debug!("{name} worker stopped");
    });
}

fn serve(client: &Client, base_url: &str, request: ApiRequest) -> ApiReply {
    match request {
        ApiRequest::Locations(req) => ApiReply::Locations(LocationReply {
            tag: req.tag,
            result: fetch_locations(client, base_url),
        }),
        ApiRequest::Presets(req) => ApiReply::Presets(PresetReply {
            tag: req.tag,
            result: fetch_presets(client, base_url),
        }),
        ApiRequest::Session => ApiReply::Session(SessionReply {
            result: get_json::<SessionInfo>(client, &endpoint(base_url, SESSION_PATH)),
        }),
        ApiRequest::Measurements(req) => ApiReply::Measurements(MeasurementReply {
            tag: req.tag,
            result: fetch_measurements(client, base_url, req.kind, &req.query),
        }),
    }
}

fn failed_reply(request: ApiRequest, err: FetchError) -> ApiReply {
    match request {
        ApiRequest::Locations(req) => ApiReply::Locations(LocationReply {
            tag: req.tag,
            result: Err(err),
        }),
        ApiRequest::Presets(req) => ApiReply::Presets(PresetReply {
            tag: req.tag,
            result: Err(err),
        }),
        ApiRequest::Session => ApiReply::Session(SessionReply { result: Err(err) }),
        ApiRequest::Measurements(req) => ApiReply::Measurements(MeasurementReply {
            tag: req.tag,
            result: Err(err),
        }),
    }
}

pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn fetch_locations(client: &Client, base_url: &str) -> Result<LocationIndex, FetchError> {
    let directory: LocationDirectory = get_json(client, &endpoint(base_url, LOCATIONS_PATH))?;
    debug!("locations fetched continents={}", directory.len());
    Ok(location_index(directory))
}

fn fetch_presets(client: &Client, base_url: &str) -> Result<Vec<Preset>, FetchError> {
    let list: PresetList = get_json(client, &endpoint(base_url, PRESETS_PATH))?;
    Ok(list.into_vec())
}

fn fetch_measurements(
    client: &Client,
    base_url: &str,
    kind: MeasurementKind,
    query: &FlatQuery,
) -> Result<MeasurementPayload, FetchError> {
    let url = endpoint(base_url, SEARCH_PATH);
    let resp = client
        .post(&url)
        .json(query)
        .send()
        .map_err(|err| FetchError::Transport(err.to_string()))?;
    let resp = check_status(resp)?;
    match kind {
        MeasurementKind::Summary => resp
            .json::<SearchSummary>()
            .map(MeasurementPayload::Summary)
            .map_err(|err| FetchError::Transport(err.to_string())),
        MeasurementKind::Hexbins => resp
            .json::<Vec<AggregatedPoint>>()
            .map(MeasurementPayload::Hexbins)
            .map_err(|err| FetchError::Transport(err.to_string())),
        MeasurementKind::Export(_) => resp
            .bytes()
            .map(|bytes| MeasurementPayload::Export(bytes.to_vec()))
            .map_err(|err| FetchError::Transport(err.to_string())),
    }
}

fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, FetchError> {
    let resp = client
        .get(url)
        .send()
        .map_err(|err| FetchError::Transport(err.to_string()))?;
    check_status(resp)?
        .json::<T>()
        .map_err(|err| FetchError::Transport(err.to_string()))
}

fn check_status(resp: Response) -> Result<Response, FetchError> {
    classify_status(resp.status())?;
    Ok(resp)
}

fn classify_status(status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Forbidden(status.as_u16()));
    }
    if !status.is_success() {
        return Err(FetchError::Transport(format!("HTTP {status}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://localhost:8000/", LOCATIONS_PATH),
            "http://localhost:8000/api/locations/"
        );
        assert_eq!(
            endpoint("https://water.example", SEARCH_PATH),
            "https://water.example/api/measurements/search/"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            Err(FetchError::Forbidden(403))
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            Err(FetchError::Forbidden(401))
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Err(FetchError::Transport(_))
        ));
        assert!(classify_status(StatusCode::OK).is_ok());
    }

    #[test]
    fn dead_client_answers_with_errors() {
        let reply = failed_reply(
            ApiRequest::Presets(PresetRequest { tag: 4 }),
            FetchError::Transport("down".to_string()),
        );
        match reply {
            ApiReply::Presets(reply) => {
                assert_eq!(reply.tag, 4);
                assert!(reply.result.is_err());
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
