//! Lock-step handshake driver.
//!
//! Runs the sans-I/O `Initiator` / `Responder` from `sealtrust` over a byte
//! stream: each role writes one message, then blocks reading the next, in
//! fixed order. A `StageHook` is awaited before every stage.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use sealtrust::handshake::messages::HandshakeMessage;
use sealtrust::handshake::Role;
use sealtrust::{Initiator, Responder, SessionKey};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::Result;
use crate::frame::{read_begin, read_response1, read_response2, write_handshake};

/// Points in the handshake where a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SendBegin,
    AwaitResponse1,
    VerifyResponse1,
    SendResponse2,
    AwaitBegin,
    SendResponse1,
    AwaitResponse2,
    VerifyResponse2,
    DeriveSessionKey,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::SendBegin => "send Begin",
            Stage::AwaitResponse1 => "await Response1",
            Stage::VerifyResponse1 => "verify Response1",
            Stage::SendResponse2 => "send Response2",
            Stage::AwaitBegin => "await Begin",
            Stage::SendResponse1 => "send Response1",
            Stage::AwaitResponse2 => "await Response2",
            Stage::VerifyResponse2 => "verify Response2",
            Stage::DeriveSessionKey => "derive session key",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called before each handshake stage; the stage starts when the returned
/// future completes.
pub trait StageHook: Send + Sync {
    fn before<'a>(&'a self, stage: Stage) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl StageHook for NoopHook {
    fn before<'a>(&'a self, _stage: Stage) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// Plain closures observe stages without pausing.
impl<F> StageHook for F
where
    F: Fn(Stage) + Send + Sync,
{
    fn before<'a>(&'a self, stage: Stage) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        self(stage);
        Box::pin(async {})
    }
}

/// Run the handshake for `role` and return the agreed session key.
pub async fn run<T>(role: Role, transport: &mut T, secret: &str, hook: &dyn StageHook) -> Result<SessionKey>
where
    T: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    match role {
        Role::Initiator => run_initiator(transport, secret, hook).await,
        Role::Responder => run_responder(transport, secret, hook).await,
    }
}

/// Initiator side: Begin out, Response1 in, Response2 out.
pub async fn run_initiator<T>(transport: &mut T, secret: &str, hook: &dyn StageHook) -> Result<SessionKey>
where
    T: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut initiator = Initiator::new(secret);

    hook.before(Stage::SendBegin).await;
    let begin = initiator.create_begin()?;
    write_handshake(transport, &HandshakeMessage::from(begin)).await?;
    debug!("begin sent");

    hook.before(Stage::AwaitResponse1).await;
    let response1 = read_response1(transport).await?;

    hook.before(Stage::VerifyResponse1).await;
    let response2 = initiator.process_response1(&response1)?;
    debug!("responder authenticated");

    hook.before(Stage::SendResponse2).await;
    write_handshake(transport, &HandshakeMessage::from(response2)).await?;

    hook.before(Stage::DeriveSessionKey).await;
    let session_key = initiator.finish()?.clone();
    info!(role = %Role::Initiator, "handshake complete");
    Ok(session_key)
}

/// Responder side: Begin in, Response1 out, Response2 in.
pub async fn run_responder<T>(transport: &mut T, secret: &str, hook: &dyn StageHook) -> Result<SessionKey>
where
    T: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut responder = Responder::new(secret);

    hook.before(Stage::AwaitBegin).await;
    let begin = read_begin(transport).await?;

    hook.before(Stage::SendResponse1).await;
    let response1 = responder.process_begin(&begin)?;
    write_handshake(transport, &HandshakeMessage::from(response1)).await?;
    debug!("response1 sent");

    hook.before(Stage::AwaitResponse2).await;
    let response2 = read_response2(transport).await?;

    hook.before(Stage::VerifyResponse2).await;
    responder.verify_response2(&response2)?;
    debug!("initiator authenticated");

    hook.before(Stage::DeriveSessionKey).await;
    let session_key = responder.finish()?.clone();
    info!(role = %Role::Responder, "handshake complete");
    Ok(session_key)
}
