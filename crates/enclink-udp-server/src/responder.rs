use std::net::UdpSocket;

use enclink_stack::message::DELIMITER;
use enclink_stack::{Message, Reply};
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Reply(String),
    /// Logged only; the device gets nothing back.
    Ignore,
}

fn ack() -> Response {
    Response::Reply(Reply::Ack("ok".to_owned()).to_string())
}

/// Decides how to answer one datagram. `now` is the wall-clock time reported for `req>>time`.
pub fn respond(payload: &str, now: PrimitiveDateTime) -> Response {
    let msg = match Message::parse(payload) {
        Ok(msg) => msg,
        Err(err) if payload.contains(DELIMITER) => {
            tracing::warn!(payload, %err, "rejected payload");
            return Response::Ignore;
        }
        Err(_) => return ack(),
    };

    match (msg.operation, msg.content) {
        ("req", "time") => Response::Reply(Reply::Time(now).to_string()),
        ("req", "alive") => Response::Reply(Reply::Alive("yes".to_owned()).to_string()),
        ("req", other) => {
            tracing::warn!(request = other, "unknown request");
            Response::Ignore
        }
        ("id", device) => {
            tracing::info!(device, "device connected");
            ack()
        }
        _ => ack(),
    }
}

/// Local wall-clock time, or UTC when the local offset cannot be determined.
pub fn local_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    PrimitiveDateTime::new(now.date(), now.time())
}

/// Receives one datagram on `socket` and answers it when `ack` is set. Returns the response
/// that was chosen, or `None` for payloads that are not UTF-8.
pub fn serve_one(
    socket: &UdpSocket,
    buf: &mut [u8],
    ack: bool,
    now: impl FnOnce() -> PrimitiveDateTime,
) -> std::io::Result<Option<Response>> {
    let (len, peer) = socket.recv_from(buf)?;
    let Ok(payload) = std::str::from_utf8(&buf[..len]) else {
        tracing::warn!(%peer, len, "payload is not UTF-8");
        return Ok(None);
    };
    tracing::info!(%peer, payload, "received");

    let response = respond(payload, now());
    if let (true, Response::Reply(reply)) = (ack, &response) {
        socket.send_to(reply.as_bytes(), peer)?;
        tracing::info!(%peer, reply = %reply, "sent");
    }
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use time::macros::datetime;

    const NOW: PrimitiveDateTime = datetime!(2023-05-01 09:05:42);

    fn reply(text: &str) -> Response {
        Response::Reply(text.to_owned())
    }

    #[test]
    fn answers_requests() {
        assert_eq!(respond("req>>time", NOW), reply("time>>2023/5/1 9:5"));
        assert_eq!(respond("req>>alive", NOW), reply("alive>>yes"));
        assert_eq!(respond("req>>weather", NOW), Response::Ignore);
    }

    #[test]
    fn everything_else_is_acknowledged() {
        assert_eq!(respond("id>>door-01", NOW), reply("ack>>ok"));
        assert_eq!(respond("msg>>gas=12", NOW), reply("ack>>ok"));
        assert_eq!(respond("open>>door", NOW), reply("ack>>ok"));
        assert_eq!(respond("hello", NOW), reply("ack>>ok"));
        assert_eq!(respond("a>>b>>c", NOW), Response::Ignore);
    }

    #[test]
    fn time_reply_round_trips_through_the_device_parser() {
        let Response::Reply(text) = respond("req>>time", NOW) else {
            panic!("expected a reply");
        };
        assert_eq!(Reply::parse(&text), Ok(Reply::Time(datetime!(2023-05-01 09:05))));
    }

    #[test]
    fn serves_over_loopback() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        client
            .send_to(b"req>>alive", server.local_addr().unwrap())
            .unwrap();

        let mut buf = [0u8; 2048];
        let response = serve_one(&server, &mut buf, true, || NOW).unwrap();
        assert_eq!(response, Some(reply("alive>>yes")));

        let mut answer = [0u8; 64];
        let (len, from) = client.recv_from(&mut answer).unwrap();
        assert_eq!(&answer[..len], b"alive>>yes");
        assert_eq!(from, server.local_addr().unwrap());
    }

    #[test]
    fn silent_mode_sends_nothing() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        client
            .send_to(b"req>>time", server.local_addr().unwrap())
            .unwrap();

        let mut buf = [0u8; 2048];
        let response = serve_one(&server, &mut buf, false, || NOW).unwrap();
        assert_eq!(response, Some(reply("time>>2023/5/1 9:5")));
        assert!(client.recv_from(&mut [0u8; 64]).is_err());
    }
}
