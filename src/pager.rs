use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default idle timeout before navigation controls are removed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Discord interaction tokens are only good for 15 minutes.
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PagerError {
    #[error("page size must be at least 1, got {0}")]
    InvalidPageSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NavigateError {
    #[error("only the user who ran the command can turn pages")]
    Unauthorized,
    #[error("this pagination session has expired")]
    SessionExpired,
}

/// Ordered, lossless chunking of a source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet {
    pages: Vec<String>,
}

impl PageSet {
    /// Split `source` into the fewest pages of at most `max_page_size` characters.
    ///
    /// Sizes are counted in `char`s so a page never ends inside a code point.
    /// An empty source still yields a single empty page.
    pub fn build(source: &str, max_page_size: usize) -> Result<Self, PagerError> {
        if max_page_size == 0 {
            return Err(PagerError::InvalidPageSize(max_page_size));
        }

        let mut pages = Vec::new();
        let mut start = 0;
        let mut count = 0;

        for (offset, _) in source.char_indices() {
            if count == max_page_size {
                pages.push(source[start..offset].to_string());
                start = offset;
                count = 0;
            }
            count += 1;
        }

        if start < source.len() || pages.is_empty() {
            pages.push(source[start..].to_string());
        }

        Ok(Self { pages })
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn count(&self) -> usize {
        self.pages.len()
    }
}

/// What a message should show for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub content: String,
    pub index: usize,
    pub total: usize,
    pub can_go_prev: bool,
    pub can_go_next: bool,
}

impl PageView {
    /// 1-based page number for display.
    pub fn page_number(&self) -> usize {
        self.index + 1
    }

    /// Whether navigation controls belong on the message at all.
    pub fn has_controls(&self) -> bool {
        self.total > 1
    }
}

/// Behavior when navigating past either end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wraparound {
    #[default]
    Clamp,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Why a session stopped accepting navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireReason {
    Timeout,
    Closed,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub idle_timeout: Duration,
    pub wraparound: Wraparound,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            wraparound: Wraparound::Clamp,
        }
    }
}

type ExpireCallback = Box<dyn FnOnce(ExpireReason) + Send>;

struct State {
    index: usize,
    active: bool,
    on_expire: Option<ExpireCallback>,
}

/// Navigation state for one paginated message.
pub struct Session {
    pages: PageSet,
    owner_id: u64,
    wraparound: Wraparound,
    expires_at: Instant,
    state: Mutex<State>,
    timer: CancellationToken,
}

impl Session {
    /// Start a session on page 0 and schedule its expiry.
    ///
    /// `on_expire` runs exactly once, when the session times out or is closed,
    /// whichever happens first. Must be called inside a tokio runtime.
    pub fn create(
        pages: PageSet,
        owner_id: u64,
        options: SessionOptions,
        on_expire: impl FnOnce(ExpireReason) + Send + 'static,
    ) -> (Arc<Self>, PageView) {
        let expires_at = Instant::now() + options.idle_timeout.min(MAX_IDLE_TIMEOUT);

        let session = Arc::new(Self {
            pages,
            owner_id,
            wraparound: options.wraparound,
            expires_at,
            state: Mutex::new(State {
                index: 0,
                active: true,
                on_expire: Some(Box::new(on_expire)),
            }),
            timer: CancellationToken::new(),
        });

        let first = session.view_at(0);

        let timer_session = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer_session.timer.cancelled() => {}
                _ = tokio::time::sleep_until(expires_at) => {
                    timer_session.expire().await;
                }
            }
        });

        (session, first)
    }

    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn page_count(&self) -> usize {
        self.pages.count()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// The page currently displayed.
    pub async fn current(&self) -> PageView {
        let index = self.state.lock().await.index;
        self.view_at(index)
    }

    /// Turn one page on behalf of `requester`.
    ///
    /// Navigation never moves the expiry deadline.
    pub async fn navigate(
        &self,
        requester: u64,
        direction: Direction,
    ) -> Result<PageView, NavigateError> {
        if requester != self.owner_id {
            return Err(NavigateError::Unauthorized);
        }

        let mut state = self.state.lock().await;
        if !state.active {
            return Err(NavigateError::SessionExpired);
        }

        // The timer task may not have run yet even though the deadline passed.
        if Instant::now() >= self.expires_at {
            let callback = Self::deactivate(&mut state);
            drop(state);
            self.notify(callback, ExpireReason::Timeout);
            return Err(NavigateError::SessionExpired);
        }

        state.index = self.step(state.index, direction);
        Ok(self.view_at(state.index))
    }

    /// End the session because its idle timeout elapsed.
    ///
    /// Returns `false` if the session had already ended.
    pub async fn expire(&self) -> bool {
        self.finish(ExpireReason::Timeout).await
    }

    /// End the session for an external reason, such as the message being deleted.
    ///
    /// Returns `false` if the session had already ended.
    pub async fn close(&self) -> bool {
        self.finish(ExpireReason::Closed).await
    }

    async fn finish(&self, reason: ExpireReason) -> bool {
        let mut state = self.state.lock().await;
        if !state.active {
            return false;
        }
        let callback = Self::deactivate(&mut state);
        drop(state);
        self.notify(callback, reason);
        true
    }

    fn deactivate(state: &mut State) -> Option<ExpireCallback> {
        state.active = false;
        state.on_expire.take()
    }

    fn notify(&self, callback: Option<ExpireCallback>, reason: ExpireReason) {
        self.timer.cancel();
        tracing::debug!(owner_id = self.owner_id, ?reason, "pagination session ended");
        if let Some(callback) = callback {
            callback(reason);
        }
    }

    fn step(&self, index: usize, direction: Direction) -> usize {
        let last = self.pages.count() - 1;
        match (direction, self.wraparound) {
            (Direction::Next, _) if index < last => index + 1,
            (Direction::Prev, _) if index > 0 => index - 1,
            (Direction::Next, Wraparound::Wrap) => 0,
            (Direction::Prev, Wraparound::Wrap) => last,
            _ => index,
        }
    }

    fn view_at(&self, index: usize) -> PageView {
        let total = self.pages.count();
        let wraps = self.wraparound == Wraparound::Wrap && total > 1;
        PageView {
            content: self.pages.pages[index].clone(),
            index,
            total,
            can_go_prev: wraps || index > 0,
            can_go_next: wraps || index + 1 < total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};
    use std::sync::Mutex as StdMutex;

    fn recorder() -> (
        Arc<StdMutex<Vec<ExpireReason>>>,
        impl FnOnce(ExpireReason) + Send + 'static,
    ) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |reason| sink.lock().unwrap().push(reason))
    }

    fn session(text: &str, size: usize, wraparound: Wraparound) -> (Arc<Session>, PageView) {
        let options = SessionOptions {
            idle_timeout: Duration::from_secs(60),
            wraparound,
        };
        Session::create(PageSet::build(text, size).unwrap(), 1, options, |_| {})
    }

    #[test]
    fn splits_into_fixed_size_pages() {
        let pages = PageSet::build("abcdefghij", 3).unwrap();
        assert_eq!(pages.pages(), ["abc", "def", "ghi", "j"]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_page() {
        let pages = PageSet::build("abcdef", 3).unwrap();
        assert_eq!(pages.pages(), ["abc", "def"]);
    }

    #[test]
    fn empty_text_is_one_empty_page() {
        let pages = PageSet::build("", 5).unwrap();
        assert_eq!(pages.pages(), [""]);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert_eq!(
            PageSet::build("text", 0),
            Err(PagerError::InvalidPageSize(0))
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let pages = PageSet::build("héllo wörld ✓", 4).unwrap();
        assert_eq!(pages.pages(), ["héll", "o wö", "rld ", "✓"]);
    }

    quickcheck! {
        fn pages_concatenate_to_source(text: String, size: u8) -> TestResult {
            if size == 0 {
                return TestResult::discard();
            }
            let pages = PageSet::build(&text, size as usize).unwrap();
            TestResult::from_bool(pages.pages().concat() == text)
        }

        fn only_the_last_page_is_short(text: String, size: u8) -> TestResult {
            if size == 0 {
                return TestResult::discard();
            }
            let size = size as usize;
            let pages = PageSet::build(&text, size).unwrap();
            let (last, full) = pages.pages().split_last().unwrap();
            let last_len = last.chars().count();
            let last_ok = if text.is_empty() {
                last_len == 0
            } else {
                last_len > 0 && last_len <= size
            };
            TestResult::from_bool(last_ok && full.iter().all(|page| page.chars().count() == size))
        }
    }

    #[tokio::test]
    async fn walks_pages_and_clamps_at_the_end() {
        let (session, first) = session("abcdefghij", 3, Wraparound::Clamp);
        assert_eq!(first.content, "abc");
        assert!(!first.can_go_prev);
        assert!(first.can_go_next);

        let second = session.navigate(1, Direction::Next).await.unwrap();
        assert_eq!(second.content, "def");
        assert!(second.can_go_prev && second.can_go_next);

        assert_eq!(
            session.navigate(2, Direction::Next).await,
            Err(NavigateError::Unauthorized)
        );
        assert_eq!(session.current().await, second);

        session.navigate(1, Direction::Next).await.unwrap();
        let last = session.navigate(1, Direction::Next).await.unwrap();
        assert_eq!(last.content, "j");
        assert!(!last.can_go_next);

        let again = session.navigate(1, Direction::Next).await.unwrap();
        assert_eq!(again, last);
    }

    #[tokio::test]
    async fn prev_on_first_page_is_a_no_op_when_clamping() {
        let (session, first) = session("abcdef", 3, Wraparound::Clamp);
        assert_eq!(session.navigate(1, Direction::Prev).await.unwrap(), first);
    }

    #[tokio::test]
    async fn wrap_policy_cycles_around() {
        let (session, first) = session("abcdefghij", 3, Wraparound::Wrap);
        assert!(first.can_go_prev);

        let last = session.navigate(1, Direction::Prev).await.unwrap();
        assert_eq!(last.content, "j");

        let back = session.navigate(1, Direction::Next).await.unwrap();
        assert_eq!(back.content, "abc");
    }

    #[tokio::test]
    async fn single_page_has_no_controls_even_when_wrapping() {
        let (_session, first) = session("short", 100, Wraparound::Wrap);
        assert!(!first.has_controls());
        assert!(!first.can_go_prev && !first.can_go_next);
    }

    #[tokio::test]
    async fn concurrent_navigation_is_serialized() {
        let (session, _) = session("abcdefghij", 3, Wraparound::Clamp);
        let (a, b) = tokio::join!(
            session.navigate(1, Direction::Next),
            session.navigate(1, Direction::Next)
        );
        let mut seen = vec![a.unwrap().index, b.unwrap().index];
        seen.sort_unstable();
        assert_eq!(seen, [1, 2]);
        assert_eq!(session.current().await.index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once_and_blocks_navigation() {
        let (seen, on_expire) = recorder();
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, SessionOptions::default(), on_expire);

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(*seen.lock().unwrap(), [ExpireReason::Timeout]);
        assert!(!session.is_active().await);
        assert_eq!(
            session.navigate(1, Direction::Next).await,
            Err(NavigateError::SessionExpired)
        );
        assert!(!session.expire().await);
        assert!(!session.close().await);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_does_not_extend_the_deadline() {
        let (seen, on_expire) = recorder();
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, SessionOptions::default(), on_expire);
        let deadline = session.expires_at();

        tokio::time::sleep(Duration::from_secs(45)).await;
        session.navigate(1, Direction::Next).await.unwrap();
        assert_eq!(session.expires_at(), deadline);

        tokio::time::sleep(Duration::from_secs(16)).await;
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock().unwrap(), [ExpireReason::Timeout]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_the_timer() {
        let (seen, on_expire) = recorder();
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, SessionOptions::default(), on_expire);

        assert!(session.close().await);
        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert_eq!(*seen.lock().unwrap(), [ExpireReason::Closed]);
    }

    #[tokio::test]
    async fn repeated_endings_notify_once() {
        let (seen, on_expire) = recorder();
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, SessionOptions::default(), on_expire);

        assert!(session.expire().await);
        assert!(!session.expire().await);
        assert!(!session.close().await);

        assert_eq!(*seen.lock().unwrap(), [ExpireReason::Timeout]);
    }

    #[tokio::test]
    async fn racing_endings_notify_once() {
        let (seen, on_expire) = recorder();
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, SessionOptions::default(), on_expire);

        let (expired, closed) = tokio::join!(session.expire(), session.close());
        assert!(expired ^ closed);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_timeout_is_capped() {
        let options = SessionOptions {
            idle_timeout: Duration::MAX,
            wraparound: Wraparound::Clamp,
        };
        let pages = PageSet::build("abcdef", 3).unwrap();
        let (session, _) = Session::create(pages, 1, options, |_| {});

        assert_eq!(session.expires_at() - Instant::now(), MAX_IDLE_TIMEOUT);
    }
}
