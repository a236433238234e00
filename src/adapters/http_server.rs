//! ESP-IDF HTTP server wiring.
//!
//! Thin translation layer between `esp_idf_svc`'s HTTP server and the
//! pure request handlers in `transport::http` and
//! `provisioning::portal`. Each platform handler parses the request into
//! the explicit request type, calls the pure handler, writes the reply,
//! and forwards any follow-up (restart, factory reset) through a shared
//! cell the main loop polls — restarts never happen on the server task.

use std::sync::{Arc, Mutex};

use esp_idf_svc::http::Method;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use log::info;

use crate::transport::http::{FollowUp, HttpReply};

pub const HTTP_PORT: u16 = 80;

/// Follow-up requested by an HTTP handler, picked up by the main loop.
pub type PendingFollowUp = Arc<Mutex<FollowUp>>;

pub fn new_pending() -> PendingFollowUp {
    Arc::new(Mutex::new(FollowUp::None))
}

/// Take the pending follow-up, leaving `None` behind.
pub fn take_pending(pending: &PendingFollowUp) -> FollowUp {
    pending
        .lock()
        .map(|mut g| core::mem::replace(&mut *g, FollowUp::None))
        .unwrap_or(FollowUp::None)
}

/// Create the server with the firmware's standard configuration.
pub fn make_server() -> anyhow::Result<EspHttpServer<'static>> {
    let server = EspHttpServer::new(&Configuration {
        http_port: HTTP_PORT,
        uri_match_wildcard: true,
        ..Default::default()
    })?;
    info!("HTTP: server started on :{HTTP_PORT}");
    Ok(server)
}

/// Write a [`HttpReply`] out through the IDF response object.
fn write_reply(
    request: Request<&mut EspHttpConnection>,
    reply: &HttpReply,
) -> anyhow::Result<()> {
    let mut headers: Vec<(&str, &str)> = vec![("Content-Type", reply.content_type)];
    if reply.no_cache {
        headers.push(("Cache-Control", "no-store, no-cache, must-revalidate"));
        headers.push(("Pragma", "no-cache"));
    }
    let mut response = request.into_response(reply.status, None, &headers)?;
    use esp_idf_svc::io::Write;
    response.write_all(&reply.body)?;
    Ok(())
}

/// Register one route that resolves through a pure handler. The
/// handler's follow-up is parked in `pending` for the main loop.
pub fn on_route<F>(
    server: &mut EspHttpServer<'static>,
    path: &str,
    method: Method,
    pending: PendingFollowUp,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(&Request<&mut EspHttpConnection>) -> (HttpReply, FollowUp) + Send + 'static,
{
    server.fn_handler(path, method, move |request| {
        let (reply, follow) = handler(&request);
        if follow != FollowUp::None {
            if let Ok(mut g) = pending.lock() {
                *g = follow;
            }
        }
        write_reply(request, &reply).map_err(|e| anyhow::anyhow!("{e}"))
    })?;
    Ok(())
}
