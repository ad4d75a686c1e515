use crate::pager::{
    Direction, ExpireReason, NavigateError, PageSet, PageView, Session, SessionOptions,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("the paginated message no longer exists")]
    MessageGone,
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Why a navigation request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    NotOwner,
    Expired,
}

/// A navigation request plus whatever the platform needs to acknowledge it.
pub struct Navigation<A> {
    pub requester: u64,
    pub direction: Direction,
    pub ack: A,
}

/// The messaging capability a paginated presentation needs.
#[async_trait]
pub trait ReplyChannel: Send {
    type Handle: Send + Sync;
    type Ack: Send;

    /// Post the first page, with controls when there is more than one page.
    async fn send_initial(&mut self, view: &PageView) -> Result<Self::Handle>;

    /// Wait for the next navigation request. `None` once no more can arrive.
    async fn next_navigation(&mut self, handle: &Self::Handle) -> Option<Navigation<Self::Ack>>;

    async fn update_message(
        &mut self,
        handle: &Self::Handle,
        ack: Self::Ack,
        view: &PageView,
    ) -> Result<(), ReplyError>;

    /// Acknowledge a request that did not change the page.
    async fn refuse(&mut self, ack: Self::Ack, refusal: Refusal) -> Result<()>;

    /// Remove navigation controls, leaving the content as is.
    async fn strip_controls(&mut self, handle: &Self::Handle) -> Result<()>;
}

enum Step<A> {
    Ended(ExpireReason),
    Navigate(Option<Navigation<A>>),
}

/// Page `text` into `channel` and serve navigation until the session ends.
///
/// Errors only if the first page could not be built or delivered. Later
/// failures are logged and the session keeps serving or closes.
pub async fn present<C: ReplyChannel>(
    channel: &mut C,
    text: &str,
    owner_id: u64,
    max_page_size: usize,
    options: SessionOptions,
) -> Result<ExpireReason> {
    let pages = PageSet::build(text, max_page_size)?;

    let (expired_tx, mut expired_rx) = oneshot::channel();
    let (session, first) = Session::create(pages, owner_id, options, move |reason| {
        let _ = expired_tx.send(reason);
    });

    let handle = match channel.send_initial(&first).await {
        Ok(handle) => handle,
        Err(e) => {
            session.close().await;
            return Err(e).context("Failed to send the first page");
        }
    };

    if !first.has_controls() {
        session.close().await;
        return Ok(ExpireReason::Closed);
    }

    tracing::debug!(
        owner_id = session.owner_id(),
        pages = session.page_count(),
        expires_in = ?session.expires_at().saturating_duration_since(tokio::time::Instant::now()),
        "serving paginated message"
    );

    let mut message_gone = false;

    loop {
        let step = tokio::select! {
            biased;
            reason = &mut expired_rx => Step::Ended(reason.unwrap_or(ExpireReason::Closed)),
            navigation = channel.next_navigation(&handle) => Step::Navigate(navigation),
        };

        match step {
            Step::Ended(reason) => {
                if !message_gone {
                    if let Err(e) = channel.strip_controls(&handle).await {
                        tracing::warn!("Failed to strip pagination controls: {:#}", e);
                    }
                }
                let last_page = session.current().await.page_number();
                tracing::debug!(?reason, last_page, "paginated message finished");
                return Ok(reason);
            }
            Step::Navigate(None) => {
                if session.is_active().await {
                    tracing::debug!("navigation events stopped before the session ended");
                }
                session.close().await;
            }
            Step::Navigate(Some(navigation)) => {
                match session
                    .navigate(navigation.requester, navigation.direction)
                    .await
                {
                    Ok(view) => {
                        match channel.update_message(&handle, navigation.ack, &view).await {
                            Ok(()) => {}
                            Err(ReplyError::MessageGone) => {
                                tracing::info!("Paginated message was deleted, closing session");
                                message_gone = true;
                                session.close().await;
                            }
                            Err(ReplyError::Transport(e)) => {
                                tracing::warn!("Failed to update paginated message: {:#}", e);
                            }
                        }
                    }
                    Err(e) => {
                        let refusal = match e {
                            NavigateError::Unauthorized => Refusal::NotOwner,
                            NavigateError::SessionExpired => Refusal::Expired,
                        };
                        tracing::debug!(requester = navigation.requester, "{}", e);
                        if let Err(e) = channel.refuse(navigation.ack, refusal).await {
                            tracing::warn!("Failed to acknowledge refused navigation: {:#}", e);
                        }
                    }
                }
            }
        }
    }
}
