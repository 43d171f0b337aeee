// Session pump: transport -> frames -> records -> canonical events -> consumer

use std::pin::pin;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::api::decode::{decode_frame, normalize};
use crate::api::frames::FrameDemux;
use crate::api::{ApiError, AskClient, AskRequest, ChunkSource};
use crate::events::{AppEvent, SessionId, StreamEvent};
use crate::models::AppConfig;
use crate::simulator::{self, Replay};

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Longest wait for the next chunk before the session errors out
    pub stall_timeout: Option<Duration>,
    /// Offline replay used when the service cannot be reached; `None` disables it
    pub fallback: Option<Replay>,
}

impl SessionSettings {
    pub const fn from_config(config: &AppConfig) -> Self {
        let stall_timeout = if config.stall_timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(config.stall_timeout))
        };
        let fallback = if config.fallback_enabled {
            Some(Replay {
                char_by_char: config.fallback_char_by_char,
                delay: Duration::from_millis(config.fallback_char_delay_ms),
            })
        } else {
            None
        };
        Self {
            stall_timeout,
            fallback,
        }
    }
}

/// How a pump finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// A `Complete` or `ErrorEvent` was forwarded
    Terminal,
    /// The transport failed mid-stream; reported as an `ErrorEvent`
    Failed,
    /// The stream ended without a terminal record
    Closed,
    /// Nobody is listening any more
    ConsumerGone,
}

/// Run one session to completion, falling back to the offline script when the
/// service cannot be reached.
pub async fn run(
    client: AskClient,
    request: AskRequest,
    session: SessionId,
    tx: UnboundedSender<AppEvent>,
    settings: SessionSettings,
) -> PumpOutcome {
    info!(session = %session, url = %client.ask_url(), "Submitting question");

    match client.ask(&request).await {
        Ok(stream) => pump(stream, session, &tx, settings.stall_timeout).await,
        Err(e) if e.is_connect_failure() => match settings.fallback {
            Some(pacing) => {
                warn!(session = %session, error = %e, "Answer service unreachable, replaying offline answer");
                if tx.send(AppEvent::FallbackActivated { session }).is_err() {
                    return PumpOutcome::ConsumerGone;
                }
                play_fallback(session, &tx, pacing).await
            }
            None => report_failure(&tx, session, &e),
        },
        Err(e) => report_failure(&tx, session, &e),
    }
}

/// Drive `source` until a terminal event, a transport failure, or end of stream.
pub async fn pump<S: ChunkSource>(
    mut source: S,
    session: SessionId,
    tx: &UnboundedSender<AppEvent>,
    stall_timeout: Option<Duration>,
) -> PumpOutcome {
    let mut demux = FrameDemux::new();

    loop {
        let chunk = match read_chunk(&mut source, stall_timeout).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return report_failure(tx, session, &e),
        };

        for payload in demux.push(&chunk) {
            let Some(event) = decode_frame(&payload).and_then(normalize) else {
                continue;
            };
            let terminal = event.is_terminal();
            if !forward(tx, session, event) {
                return PumpOutcome::ConsumerGone;
            }
            if terminal {
                debug!(session = %session, "Terminal event forwarded, closing stream");
                return PumpOutcome::Terminal;
            }
        }
    }

    demux.finish();
    if tx.send(AppEvent::StreamClosed { session }).is_err() {
        return PumpOutcome::ConsumerGone;
    }
    PumpOutcome::Closed
}

async fn read_chunk<S: ChunkSource>(
    source: &mut S,
    stall_timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>, ApiError> {
    match stall_timeout {
        Some(limit) => tokio::time::timeout(limit, source.next_chunk())
            .await
            .map_err(|_| ApiError::Stalled(limit))?,
        None => source.next_chunk().await,
    }
}

async fn play_fallback(
    session: SessionId,
    tx: &UnboundedSender<AppEvent>,
    pacing: Replay,
) -> PumpOutcome {
    let mut events = pin!(simulator::replay(pacing));
    while let Some(event) = events.next().await {
        if !forward(tx, session, event) {
            return PumpOutcome::ConsumerGone;
        }
    }
    PumpOutcome::Terminal
}

fn report_failure(tx: &UnboundedSender<AppEvent>, session: SessionId, error: &ApiError) -> PumpOutcome {
    warn!(session = %session, error = %error, "Session failed");
    let event = StreamEvent::ErrorEvent {
        message: error.to_string(),
    };
    if forward(tx, session, event) {
        PumpOutcome::Failed
    } else {
        PumpOutcome::ConsumerGone
    }
}

fn forward(tx: &UnboundedSender<AppEvent>, session: SessionId, event: StreamEvent) -> bool {
    tx.send(AppEvent::Stream { session, event }).is_ok()
}
