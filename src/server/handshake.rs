//! Connection handshake.
//!
//! The server issues credentials (`authIdentity`), waits for the client to answer with an
//! `updateIdentity` for that exact id, confirms with `registered`, and only then hands the
//! transport over to the session core. Any failure forgets the issued identity and closes
//! the transport.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::config::server::HANDSHAKE_TIMEOUT_SECS;
use crate::identity::{Identity, IdentityError};
use crate::server::connection::ConnectionSession;
use crate::server::messages::{ClientEnvelope, ClientMessage, DecodeError, ServerMessage, UPDATE_IDENTITY};
use crate::server::session_router::SessionRouter;
use crate::server::transport::{FrameReader, FrameWriter, TransportError};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to serialize {kind}: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected updateIdentity, got '{0}'")]
    UnexpectedMessage(String),
    #[error("identity mismatch: issued {expected}, got {got}")]
    IdentityMismatch { expected: String, got: String },
    #[error("identity update rejected for {0}")]
    Rejected(String),
    #[error("client did not answer in time")]
    Timeout,
    #[error("server is shutting down")]
    ShuttingDown,
}

async fn write(writer: &dyn FrameWriter, msg: &ServerMessage) -> Result<(), HandshakeError> {
    let frame = serde_json::to_vec(msg).map_err(|source| HandshakeError::Serialize {
        kind: msg.kind(),
        source,
    })?;
    writer.write_frame(frame).await?;
    Ok(())
}

/// Run the handshake on a fresh transport and, on success, start the connection's tasks.
pub async fn accept(
    router: &Arc<SessionRouter>,
    mut reader: Box<dyn FrameReader>,
    writer: Box<dyn FrameWriter>,
) -> Result<Arc<ConnectionSession>, HandshakeError> {
    let registry = router.registry();
    let issued = registry.register()?;

    match negotiate(router, &issued, reader.as_mut(), writer.as_ref()).await {
        Ok(identity) => {
            info!("[Handshake] Player {} registered", identity.id);
            Ok(router.attach(identity, reader, writer))
        }
        Err(e) => {
            warn!("[Handshake] Failed for {}: {}", issued.id, e);
            registry.remove(&issued.id);
            writer.close().await;
            Err(e)
        }
    }
}

async fn negotiate(
    router: &SessionRouter,
    issued: &Identity,
    reader: &mut dyn FrameReader,
    writer: &dyn FrameWriter,
) -> Result<Identity, HandshakeError> {
    write(writer, &ServerMessage::AuthIdentity { identity: issued.initial() }).await?;

    let timeout = Duration::from_secs(HANDSHAKE_TIMEOUT_SECS);
    let frame = tokio::select! {
        _ = router.supervisor().token().cancelled() => return Err(HandshakeError::ShuttingDown),
        read = tokio::time::timeout(timeout, reader.read_frame()) => {
            read.map_err(|_| HandshakeError::Timeout)??
        }
    };

    let envelope = ClientEnvelope::decode(&frame)?;
    if envelope.kind != UPDATE_IDENTITY {
        return Err(HandshakeError::UnexpectedMessage(envelope.kind));
    }
    let update = match envelope.into_message()? {
        ClientMessage::UpdateIdentity(update) => update,
        other => return Err(HandshakeError::UnexpectedMessage(format!("{:?}", other))),
    };
    if update.id != issued.id {
        return Err(HandshakeError::IdentityMismatch {
            expected: issued.id.clone(),
            got: update.id,
        });
    }
    let registry = router.registry();
    if !registry.update(&update) {
        return Err(HandshakeError::Rejected(update.id));
    }

    let identity = registry.get(&issued.id)?;
    write(writer, &ServerMessage::Registered { identity: identity.safe() }).await?;
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::identity::IdentityRegistry;
    use crate::server::supervisor::Supervisor;
    use crate::server::testing::{duplex, envelope, ClientEnd};

    fn router() -> Arc<SessionRouter> {
        let registry = Arc::new(IdentityRegistry::new().expect("entropy"));
        SessionRouter::new(registry, Supervisor::new())
    }

    /// Start a handshake and read the issued credentials off the wire.
    async fn begin(
        router: &Arc<SessionRouter>,
    ) -> (tokio::task::JoinHandle<Result<Arc<ConnectionSession>, HandshakeError>>, ClientEnd, Identity) {
        let (reader, writer, mut client) = duplex();
        let task = {
            let router = Arc::clone(router);
            tokio::spawn(async move { accept(&router, reader, writer).await })
        };
        let auth = client.expect_type("authIdentity").await;
        let id = auth["content"]["identity"]["id"].as_str().expect("id");
        let secret = auth["content"]["identity"]["secret"].as_str().expect("secret");
        (task, client, Identity::new(id, secret))
    }

    #[tokio::test]
    async fn test_successful_handshake() {
        let router = router();
        let (task, mut client, mut identity) = begin(&router).await;

        identity.display_name = "Grace".into();
        identity.avatar = "owl".into();
        client.send_json(envelope(UPDATE_IDENTITY, &identity, Some(json!({"identity": identity}))));

        let registered = client.expect_type("registered").await;
        assert_eq!(registered["content"]["identity"]["displayName"], "Grace");
        assert!(registered["content"]["identity"].get("secret").is_none());

        let conn = task.await.expect("task").expect("handshake");
        assert_eq!(conn.id(), identity.id);
        assert_eq!(conn.identity().avatar, "owl");

        // The read loop is live.
        client.send_json(envelope("gameRequest", &identity, None));
        client.expect_type("gameWaiting").await;
        router.supervisor().shutdown().await;
    }

    #[tokio::test]
    async fn test_wrong_first_message_fails() {
        let router = router();
        let (task, client, identity) = begin(&router).await;
        client.send_json(envelope("gameRequest", &identity, None));

        let err = task.await.expect("task").expect_err("must fail");
        assert!(matches!(err, HandshakeError::UnexpectedMessage(kind) if kind == "gameRequest"));
        assert!(router.registry().is_empty());
        assert!(client.is_closed_by_server());
    }

    #[tokio::test]
    async fn test_foreign_identity_fails() {
        let router = router();
        let (task, client, identity) = begin(&router).await;
        let mut other = identity.clone();
        other.id = "not-mine".into();
        client.send_json(envelope(UPDATE_IDENTITY, &identity, Some(json!({"identity": other}))));

        let err = task.await.expect("task").expect_err("must fail");
        assert!(matches!(err, HandshakeError::IdentityMismatch { .. }));
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let router = router();
        let (task, client, identity) = begin(&router).await;
        let mut forged = identity.clone();
        forged.secret = "guess".into();
        client.send_json(envelope(UPDATE_IDENTITY, &identity, Some(json!({"identity": forged}))));

        let err = task.await.expect("task").expect_err("must fail");
        assert!(matches!(err, HandshakeError::Rejected(_)));
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn test_client_hangup_and_shutdown() {
        let router = router();
        let (task, client, _) = begin(&router).await;
        client.close(true);
        let err = task.await.expect("task").expect_err("must fail");
        assert!(matches!(err, HandshakeError::Transport(TransportError::Closed { normal: true })));

        let (task, _client, _) = begin(&router).await;
        router.supervisor().token().cancel();
        let err = task.await.expect("task").expect_err("must fail");
        assert!(matches!(err, HandshakeError::ShuttingDown));
        assert!(router.registry().is_empty());
    }
}
