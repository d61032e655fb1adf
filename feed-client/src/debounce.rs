use crate::models::{FeedFilter, FeedQuery};
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// One raw change coming from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryInput {
    /// Search box contents after a keystroke.
    Search(String),
    /// A discrete filter selection.
    Filter(FeedFilter),
}

struct DebounceState<S> {
    inputs: S,
    quiet: Duration,
    pending: Option<(String, Instant)>,
    search_text: String,
    filter: FeedFilter,
    last_emitted: FeedQuery,
    exhausted: bool,
}

enum Event {
    Input(Option<QueryInput>),
    Quiet,
}

/// Turns raw input into effective feed queries.
///
/// Search text is emitted once it has been stable for `quiet`; filter changes
/// are emitted at once, combined with the last emitted search text. A query
/// equal to the previous emission (initially `initial`) is never repeated.
pub fn debounce_queries<S>(
    inputs: S,
    quiet: Duration,
    initial: FeedQuery,
) -> impl Stream<Item = FeedQuery>
where
    S: Stream<Item = QueryInput> + Unpin,
{
    let state = DebounceState {
        inputs,
        quiet,
        pending: None,
        search_text: initial.search_text.clone(),
        filter: initial.filter(),
        last_emitted: initial,
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let event = match (&state.pending, state.exhausted) {
                (None, true) => return None,
                (None, false) => Event::Input(state.inputs.next().await),
                (Some((_, deadline)), exhausted) => {
                    let deadline = *deadline;
                    tokio::select! {
                        input = state.inputs.next(), if !exhausted => Event::Input(input),
                        _ = sleep_until(deadline) => Event::Quiet,
                    }
                }
            };

            let candidate = match event {
                Event::Input(Some(QueryInput::Search(text))) => {
                    state.pending = Some((text, Instant::now() + state.quiet));
                    continue;
                }
                Event::Input(Some(QueryInput::Filter(filter))) => {
                    state.filter = filter;
                    FeedQuery::new(state.search_text.clone(), state.filter.clone())
                }
                // pending text still gets its quiet window
                Event::Input(None) => {
                    state.exhausted = true;
                    continue;
                }
                Event::Quiet => {
                    if let Some((text, _)) = state.pending.take() {
                        state.search_text = text;
                    }
                    FeedQuery::new(state.search_text.clone(), state.filter.clone())
                }
            };

            if candidate != state.last_emitted {
                tracing::debug!("Effective feed query: {:?}", candidate);
                state.last_emitted = candidate.clone();
                return Some((candidate, state));
            }
        }
    })
}

/// Input side of a running debouncer; dropping it ends the query stream.
#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<QueryInput>,
}

impl Debouncer {
    pub fn new(quiet: Duration, initial: FeedQuery) -> (Self, BoxStream<'static, FeedQuery>) {
        let (tx, rx) = mpsc::unbounded();
        let queries = debounce_queries(rx, quiet, initial).boxed();
        (Self { tx }, queries)
    }

    pub fn search(&self, text: impl Into<String>) {
        self.send(QueryInput::Search(text.into()));
    }

    pub fn filter(&self, filter: FeedFilter) {
        self.send(QueryInput::Filter(filter));
    }

    fn send(&self, input: QueryInput) {
        if self.tx.unbounded_send(input).is_err() {
            tracing::debug!("Query stream closed, input dropped");
        }
    }
}
