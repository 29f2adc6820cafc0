//! Lazy, forward-only page sequences.
//!
//! Every follow-up page is a fresh [`RequestEnvelope`] derived from the first request plus the
//! platform cursor, sent back through [`AdPlatformClient::execute`], so later pages are still
//! rate-limited and breaker-protected. Streams live in memory only; a caller that must resume
//! after a restart persists [`Page::cursor`] and re-applies it with [`PageCursor::apply`].

// std
use std::collections::HashSet;
// crates.io
use futures::Stream;
use serde_json::Value;
// self
use super::{AdPlatformClient, ApiResponse, CallOptions};
use crate::{
	_prelude::*,
	auth::Platform,
	error::TransientError,
	mapping::DecodedPage,
	request::RequestEnvelope,
};

const META_CURSOR_PARAM: &str = "after";
const GOOGLE_CURSOR_FIELD: &str = "pageToken";

pub(crate) type PageDecoder<T> =
	Arc<dyn Fn(&ApiResponse) -> Result<DecodedPage<T>, TransientError> + Send + Sync>;

/// Platform continuation token for the page after the current one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageCursor(String);
impl PageCursor {
	/// Wraps a cursor previously read from [`PageCursor::as_str`].
	pub fn new(token: impl Into<String>) -> Self {
		Self(token.into())
	}

	/// Raw platform token.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Derives the follow-up request from the first page's envelope.
	///
	/// Meta continues with the `after` query parameter; Google Ads with `pageToken` in the
	/// search body.
	pub fn apply(&self, template: &RequestEnvelope) -> RequestEnvelope {
		let mut envelope = template.clone();

		envelope.attempt = 0;

		match envelope.platform {
			Platform::Meta => envelope.set_query_param(META_CURSOR_PARAM, self.0.as_str()),
			Platform::GoogleAds => {
				let body = envelope.body.get_or_insert_with(|| Value::Object(Default::default()));

				if let Some(object) = body.as_object_mut() {
					object.insert(GOOGLE_CURSOR_FIELD.into(), Value::String(self.0.clone()));
				}
			},
		}

		envelope
	}
}

/// One page of decoded items.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
	/// Items on the page, in platform order.
	pub items: Vec<T>,
	/// Zero-based position of the page within the current pass.
	pub index: usize,
	/// Cursor for the next page; `None` on the last page.
	pub cursor: Option<PageCursor>,
}

enum PageState<T> {
	Buffered(Page<T>),
	Start,
	Next(PageCursor),
	Done,
}

/// Lazy page sequence backed by the executor.
///
/// The sequence ends when the platform stops returning a cursor, when a cursor repeats within
/// the pass, or after the first error. [`restart`](Self::restart) begins a new pass from the
/// first page.
pub struct PageStream<T> {
	client: AdPlatformClient,
	template: RequestEnvelope,
	options: CallOptions,
	decoder: PageDecoder<T>,
	state: PageState<T>,
	index: usize,
	seen: HashSet<PageCursor>,
}
impl<T> PageStream<T> {
	/// Fetches the first page eagerly so request and authorization errors surface immediately.
	pub(crate) async fn start(
		client: AdPlatformClient,
		template: RequestEnvelope,
		options: CallOptions,
		decoder: PageDecoder<T>,
	) -> Result<Self> {
		let mut stream = Self {
			client,
			template,
			options,
			decoder,
			state: PageState::Done,
			index: 0,
			seen: HashSet::new(),
		};
		let first = stream.fetch(stream.template.clone()).await?;

		stream.state = PageState::Buffered(first);

		Ok(stream)
	}

	/// Pulls the next page; `None` once the pass has ended.
	pub async fn next_page(&mut self) -> Option<Result<Page<T>>> {
		let envelope = match std::mem::replace(&mut self.state, PageState::Done) {
			PageState::Buffered(page) => {
				self.follow(&page);

				return Some(Ok(page));
			},
			PageState::Start => self.template.clone(),
			PageState::Next(cursor) => cursor.apply(&self.template),
			PageState::Done => return None,
		};

		match self.fetch(envelope).await {
			Ok(page) => {
				self.follow(&page);

				Some(Ok(page))
			},
			Err(e) => Some(Err(e)),
		}
	}

	/// Rewinds to the first page; the next pull re-issues the initial request.
	pub fn restart(&mut self) {
		self.state = PageState::Start;
		self.index = 0;
		self.seen.clear();
	}

	/// Drains the remaining pages of the pass into one list.
	pub async fn collect_items(mut self) -> Result<Vec<T>> {
		let mut items = Vec::new();

		while let Some(page) = self.next_page().await {
			items.extend(page?.items);
		}

		Ok(items)
	}

	/// Adapts the sequence into a [`Stream`] of pages.
	pub fn into_stream(self) -> impl Stream<Item = Result<Page<T>>> {
		futures::stream::unfold(self, |mut stream| async move {
			let page = stream.next_page().await?;

			Some((page, stream))
		})
	}

	async fn fetch(&mut self, envelope: RequestEnvelope) -> Result<Page<T>> {
		let response = self.client.execute(envelope, self.options.clone()).await?;
		let decoded = (self.decoder)(&response)?;
		let cursor = decoded
			.cursor
			.map(PageCursor)
			.filter(|cursor| self.seen.insert(cursor.clone()));
		let page = Page { items: decoded.items, index: self.index, cursor };

		self.index += 1;

		Ok(page)
	}

	fn follow(&mut self, page: &Page<T>) {
		self.state = match &page.cursor {
			Some(cursor) => PageState::Next(cursor.clone()),
			None => PageState::Done,
		};
	}
}
impl<T> Debug for PageStream<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PageStream")
			.field("operation", &self.template.operation)
			.field("platform", &self.template.platform)
			.field("index", &self.index)
			.field("done", &matches!(self.state, PageState::Done))
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{AccountId, OrgId},
		request::{EndpointCategory, GaqlQuery, OperationKind, google, meta},
	};

	fn org() -> OrgId {
		OrgId::new("org-1").expect("Org fixture should be valid.")
	}

	#[test]
	fn meta_cursor_replaces_after_parameter() {
		let template = meta::accounts_envelope(&org());
		let second = PageCursor::new("c1").apply(&template);
		let third = PageCursor::new("c2").apply(&second);
		let afters = third.query.iter().filter(|(name, _)| name == "after").collect::<Vec<_>>();

		assert_eq!(afters, [&("after".to_owned(), "c2".to_owned())]);
		assert!(template.query.iter().all(|(name, _)| name != "after"));
	}

	#[test]
	fn google_cursor_lands_in_search_body() {
		let account = AccountId::for_platform(Platform::GoogleAds, "123-456-7890")
			.expect("Account fixture should be valid.");
		let query = GaqlQuery::builder("campaign")
			.select("campaign.id")
			.build()
			.expect("Query should build.");
		let mut template = google::search_envelope(
			&org(),
			&account,
			&query,
			OperationKind::RunQuery,
			EndpointCategory::Query,
		);

		template.attempt = 2;

		let next = PageCursor::new("token-2").apply(&template);
		let body = next.body.expect("Search envelope should carry a body.");

		assert_eq!(body["pageToken"], "token-2");
		assert_eq!(body["query"], query.as_str());
		assert_eq!(next.attempt, 0);
	}
}
