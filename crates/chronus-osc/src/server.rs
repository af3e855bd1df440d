//! UDP OSC server thread.
//!
//! Binds the configured address, decodes datagrams with `rosc`, validates
//! through [`parse_message`](crate::namespace::parse_message), and pushes
//! requests into the control channel. Schema and status queries are
//! answered straight back to the sender as an OSC message whose single
//! argument is a JSON string, so monitoring never blocks on the control
//! loop.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use chronus_core::{ModuleSchema, SmoothingMode};
use chronus_engine::StatusHandle;
use chronus_registry::ModuleRegistry;
use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};
use serde_json::json;

use crate::namespace::{ControlRequest, Parsed, Query, parse_message};
use crate::OscError;

/// Poll interval for the shutdown flag while waiting for datagrams.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Running OSC server; drop or [`shutdown`](Self::shutdown) to stop.
pub struct OscServer {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl OscServer {
    /// Binds `host:port` and starts the receiver thread.
    pub fn spawn(
        host: &str,
        port: u16,
        requests: Sender<ControlRequest>,
        registry: Arc<ModuleRegistry>,
        status: StatusHandle,
    ) -> Result<Self, OscError> {
        let addr = format!("{host}:{port}");
        let socket = UdpSocket::bind(&addr).map_err(|source| OscError::Bind {
            addr: addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(OscError::Socket)?;
        let local_addr = socket.local_addr().map_err(OscError::Socket)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("chronus-osc".into())
            .spawn(move || {
                receive_loop(&socket, &stop_flag, &requests, &registry, &status);
            })
            .map_err(OscError::Socket)?;

        tracing::info!(%local_addr, "osc server listening");
        Ok(Self {
            thread: Some(thread),
            stop,
            local_addr,
        })
    }

    /// The bound address (useful when spawned on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the receiver thread and joins it.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn receive_loop(
    socket: &UdpSocket,
    stop: &AtomicBool,
    requests: &Sender<ControlRequest>,
    registry: &ModuleRegistry,
    status: &StatusHandle,
) {
    let mut buf = [0u8; rosc::decoder::MTU];
    while !stop.load(Ordering::Acquire) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "osc socket error");
                continue;
            }
        };

        match rosc::decoder::decode_udp(&buf[..len]) {
            Ok((_, packet)) => handle_packet(socket, packet, from, requests, registry, status),
            Err(e) => {
                status
                    .engine
                    .malformed_messages
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "undecodable osc packet dropped");
            }
        }
    }
}

fn handle_packet(
    socket: &UdpSocket,
    packet: OscPacket,
    from: SocketAddr,
    requests: &Sender<ControlRequest>,
    registry: &ModuleRegistry,
    status: &StatusHandle,
) {
    match packet {
        OscPacket::Message(msg) => handle_message(socket, &msg, from, requests, registry, status),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                handle_packet(socket, inner, from, requests, registry, status);
            }
        }
    }
}

fn handle_message(
    socket: &UdpSocket,
    msg: &OscMessage,
    from: SocketAddr,
    requests: &Sender<ControlRequest>,
    registry: &ModuleRegistry,
    status: &StatusHandle,
) {
    match parse_message(msg) {
        Ok(Parsed::Request(request)) => {
            if requests.send(request).is_err() {
                tracing::warn!("control loop gone, request dropped");
            }
        }
        Ok(Parsed::Query(query)) => {
            let body = match query {
                Query::Schema => schema_json(registry),
                Query::Status => serde_json::to_string(&status.snapshot())
                    .unwrap_or_else(|_| "{}".into()),
            };
            reply(socket, from, &msg.addr, body);
        }
        Err(e) => {
            status
                .engine
                .malformed_messages
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(addr = %msg.addr, error = %e, "malformed message dropped");
        }
    }
}

fn reply(socket: &UdpSocket, to: SocketAddr, addr: &str, body: String) {
    let msg = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args: vec![OscType::String(body)],
    });
    match rosc::encoder::encode(&msg) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, to) {
                tracing::warn!(error = %e, "query reply failed");
            }
        }
        Err(e) => tracing::error!(error = %e, "query reply encode failed"),
    }
}

/// Registry schemas as the `/engine/schema` JSON document.
pub fn schema_json(registry: &ModuleRegistry) -> String {
    let modules: Vec<_> = registry.schemas().map(schema_entry).collect();
    json!({ "modules": modules }).to_string()
}

fn schema_entry(schema: &ModuleSchema) -> serde_json::Value {
    let params: Vec<_> = schema
        .params
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "min": p.min,
                "max": p.max,
                "default": p.default,
                "unit": p.unit.name(),
                "smoothing": smoothing_entry(p.smoothing),
            })
        })
        .collect();
    json!({
        "type": schema.type_name,
        "max_inputs": schema.max_inputs,
        "params": params,
    })
}

fn smoothing_entry(mode: SmoothingMode) -> serde_json::Value {
    match mode {
        SmoothingMode::None => json!({ "mode": "none" }),
        SmoothingMode::Linear { window_ms } => {
            json!({ "mode": "linear", "window_ms": window_ms })
        }
        SmoothingMode::OnePole { window_ms } => {
            json!({ "mode": "one_pole", "window_ms": window_ms })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_core::Opcode;
    use std::sync::atomic::AtomicUsize;

    fn status_fixture() -> StatusHandle {
        StatusHandle {
            engine: Arc::default(),
            slots: [Arc::default(), Arc::default()],
            audio: [Arc::default(), Arc::default()],
            commands: [Arc::default(), Arc::default()],
            active_index: Arc::new(AtomicUsize::new(0)),
            pending_switch: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_server() -> (OscServer, crossbeam_channel::Receiver<ControlRequest>, StatusHandle)
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let status = status_fixture();
        let server = OscServer::spawn(
            "127.0.0.1",
            0,
            tx,
            Arc::new(ModuleRegistry::with_builtins()),
            status.clone(),
        )
        .unwrap();
        (server, rx, status)
    }

    fn send(server: &OscServer, msg: OscMessage) -> UdpSocket {
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let bytes = rosc::encoder::encode(&OscPacket::Message(msg)).unwrap();
        client.send_to(&bytes, server.local_addr()).unwrap();
        client
    }

    #[test]
    fn set_message_reaches_control_channel() {
        let (server, rx, _status) = spawn_server();
        send(
            &server,
            OscMessage {
                addr: "/mod/osc1/freq".into(),
                args: vec![OscType::Float(440.0)],
            },
        );

        let request = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let ControlRequest::Broadcast(rec) = request else {
            panic!("expected broadcast, got {request:?}");
        };
        assert_eq!(rec.op, Opcode::Set);
        assert_eq!(rec.module, "osc1");
        server.shutdown();
    }

    #[test]
    fn malformed_message_counted_and_dropped() {
        let (server, rx, status) = spawn_server();
        send(
            &server,
            OscMessage {
                addr: "/mod/BAD_ID/freq".into(),
                args: vec![OscType::Float(1.0)],
            },
        );

        // Give the server a beat, then confirm: nothing forwarded, one
        // counted.
        std::thread::sleep(Duration::from_millis(200));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            status.engine.malformed_messages.load(Ordering::Relaxed),
            1
        );
        server.shutdown();
    }

    #[test]
    fn schema_query_replies_with_json() {
        let (server, _rx, _status) = spawn_server();
        let client = send(
            &server,
            OscMessage {
                addr: "/engine/schema".into(),
                args: vec![],
            },
        );
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut buf = [0u8; rosc::decoder::MTU];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        let OscPacket::Message(reply) = packet else {
            panic!("expected message reply");
        };
        assert_eq!(reply.addr, "/engine/schema");
        let [OscType::String(body)] = reply.args.as_slice() else {
            panic!("expected one string arg");
        };
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        let modules = parsed["modules"].as_array().unwrap();
        assert!(modules.iter().any(|m| m["type"] == "sine"));
        let sine = modules.iter().find(|m| m["type"] == "sine").unwrap();
        assert!(
            sine["params"]
                .as_array()
                .unwrap()
                .iter()
                .any(|p| p["name"] == "freq")
        );
        server.shutdown();
    }

    #[test]
    fn status_query_replies_with_counters() {
        let (server, _rx, status) = spawn_server();
        status.engine.commits.store(7, Ordering::Relaxed);

        let client = send(
            &server,
            OscMessage {
                addr: "/engine/status".into(),
                args: vec![],
            },
        );
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut buf = [0u8; rosc::decoder::MTU];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        let OscPacket::Message(reply) = packet else {
            panic!();
        };
        let [OscType::String(body)] = reply.args.as_slice() else {
            panic!();
        };
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["commits"], 7);
        server.shutdown();
    }
}
