//! Fixed-window request limits per client address.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;

use crate::error::AppError;

/// Windows kept before expired ones are dropped.
const TRACKED_CLIENTS: usize = 1024;

struct Window {
    started: Instant,
    hits: u32,
}

pub struct RateLimiter {
    max: u32,
    window: Duration,
    message: &'static str,
    // `None` when the server runs without connection info
    clients: Mutex<HashMap<Option<IpAddr>, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration, message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            max,
            window,
            message,
            clients: Mutex::default(),
        })
    }

    /// Counts one request of `client` at `now`; false once over the limit.
    fn admit(&self, client: Option<IpAddr>, now: Instant) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() >= TRACKED_CLIENTS {
            clients.retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let window = clients.entry(client).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.hits = 0;
        }

        window.hits = window.hits.saturating_add(1);
        window.hits <= self.max
    }
}

pub async fn limit(
    State(limiter): State<Arc<RateLimiter>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client = peer.map(|ConnectInfo(addr)| addr.ip());

    if !limiter.admit(client, Instant::now()) {
        warn!("Rate limit hit by {client:?} on {}", request.uri().path());
        return AppError::RateLimited(limiter.message.to_string()).into_response();
    }
    next.run(request).await
}
