use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::spotify::api::{NowPlaying, Spotify};
use crate::spotify::CredentialHandle;

pub use render::{Card, Templates};

pub mod render;

#[derive(Debug, Default, Deserialize)]
struct PlayQuery {
    mode: Option<String>,
}

fn response<B: Into<Bytes>>(status: StatusCode, content_type: &'static str, body: B) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    response(status, "application/json; charset=utf-8", body.to_string())
}

/// No caching, open CORS and a small stamp on every response
fn stamp(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, max-age=0"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(HeaderName::from_static("x-powered-by"), HeaderValue::from_static("WhatIAmPlaying"));
    response
}

struct Shared {
    credentials: CredentialHandle,
    spotify: Spotify,
    templates: Templates,
}

/// Request handler for the widget routes.
///
/// Handlers only read the cached credentials; they never trigger a refresh.
#[derive(Clone)]
pub struct Router {
    shared: Arc<Shared>,
    remote: Option<SocketAddr>,
}

impl Router {
    pub fn new(credentials: CredentialHandle, spotify: Spotify, templates: Templates) -> Self {
        Self {
            shared: Arc::new(Shared {
                credentials,
                spotify,
                templates,
            }),
            remote: None,
        }
    }

    /// Router for one connection, so requests are logged with their peer
    pub fn with_remote(&self, remote: SocketAddr) -> Self {
        Self {
            shared: self.shared.clone(),
            remote: Some(remote),
        }
    }

    pub async fn handle(&self, method: &Method, path: &str, query: Option<&str>) -> Response<Full<Bytes>> {
        let response = match (method, path) {
            (&Method::GET, "/") => json_response(
                StatusCode::OK,
                json!({"status": "ok", "name": "WhatIAmPlaying", "routes": ["/play"]}),
            ),
            (&Method::GET, "/robots.txt") => {
                response(StatusCode::OK, "text/plain; charset=utf-8", "User-agent: *\nDisallow: /")
            }
            (&Method::GET, "/play") => {
                let query: PlayQuery = query
                    .and_then(|q| serde_qs::from_str(q).ok())
                    .unwrap_or_default();
                match query.mode.as_deref() {
                    Some("json") => self.play_json().await,
                    _ => self.play_card().await,
                }
            }
            _ => json_response(StatusCode::NOT_FOUND, json!({"status": "not found"})),
        };
        stamp(response)
    }

    async fn now_playing(&self) -> Option<NowPlaying> {
        let credentials = self.shared.credentials.current();
        match self.shared.spotify.currently_playing(&credentials).await {
            Ok(playing) => playing,
            Err(err) => {
                log::warn!("failed to fetch currently playing item: {err}");
                None
            }
        }
    }

    async fn play_json(&self) -> Response<Full<Bytes>> {
        match self.now_playing().await {
            Some(now) => json_response(StatusCode::OK, json!({"status": "ok", "song": now.song})),
            None => json_response(
                StatusCode::NOT_FOUND,
                json!({"status": "error", "message": "Nothing is being played."}),
            ),
        }
    }

    async fn play_card(&self) -> Response<Full<Bytes>> {
        let svg = match self.now_playing().await {
            Some(now) => self.card(&now).await,
            None => self.shared.templates.nothing(),
        };

        match svg.and_then(|svg| self.shared.templates.rasterize(&svg)) {
            Ok(jpeg) => response(StatusCode::OK, "image/jpeg", jpeg),
            Err(err) => {
                log::error!("failed to render card: {err}");
                response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    "Something went wrong when parsing the results...",
                )
            }
        }
    }

    async fn card(&self, now: &NowPlaying) -> Result<String, Error> {
        let spotify = &self.shared.spotify;
        let barcode_url = spotify.scannable_url(&now.uri);
        let (cover, barcode) = tokio::join!(spotify.download(&now.song.cover), spotify.download(&barcode_url));

        let mut card = Card::new(&now.song);
        card.icon = self.shared.templates.icon(now.kind)?;
        match cover {
            Ok(bytes) => card.cover = render::data_uri("image/jpeg", &render::cover_jpeg(&bytes)),
            Err(err) => log::warn!("failed to download cover art: {err}"),
        }
        match barcode {
            Ok(bytes) => card.barcode = render::data_uri("image/png", &bytes),
            Err(err) => log::warn!("failed to download scannable code: {err}"),
        }
        self.shared.templates.playing(&card)
    }
}

impl Service<Request<Incoming>> for Router {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move {
            log::info!("{}", access_line(req.method(), req.uri(), router.remote));
            let response = router
                .handle(req.method(), req.uri().path(), req.uri().query())
                .await;
            log::debug!("{} {} -> {}", req.method(), req.uri(), response.status());
            Ok(response)
        })
    }
}

fn access_line(method: &Method, uri: &hyper::Uri, remote: Option<SocketAddr>) -> String {
    match remote {
        Some(remote) => format!("{method} {uri} {}", remote.ip()),
        None => format!("{method} {uri} -"),
    }
}

/// Accept connections until `shutdown` is cancelled
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> std::io::Result<()> {
    loop {
        let (stream, remote) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::warn!("failed to accept connection: {err}");
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let handler = router.with_remote(remote);
        let shutdown = shutdown.clone();
        tokio::task::spawn(async move {
            let connection = http1::Builder::new().serve_connection(io, handler);
            tokio::pin!(connection);
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(err) = result {
                        log::debug!("error serving connection from {remote}: {err:?}");
                    }
                }
                _ = shutdown.cancelled() => {
                    connection.as_mut().graceful_shutdown();
                    let _ = connection.await;
                }
            }
        });
    }
    Ok(())
}
