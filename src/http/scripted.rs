//! In-memory [`Transport`] that replays scripted replies; used by tests and demos.

// std
use std::collections::VecDeque;
// crates.io
use oauth2::http::{HeaderName, HeaderValue, StatusCode};
// self
use crate::{
	_prelude::*,
	error::TransportError,
	http::{HttpRequest, HttpResponse, Transport, TransportFuture},
};

/// One scripted answer for a route.
#[derive(Clone, Debug)]
pub struct Reply {
	kind: ReplyKind,
	delay: Option<std::time::Duration>,
}
#[derive(Clone, Debug)]
enum ReplyKind {
	Response { status: u16, headers: Vec<(String, String)>, body: Vec<u8> },
	NetworkError,
}
impl Reply {
	/// Replies with `status` and a JSON body.
	pub fn json(status: u16, body: serde_json::Value) -> Self {
		Self::bytes(status, body.to_string().into_bytes())
			.header("content-type", "application/json")
	}

	/// Replies with `status` and an empty body.
	pub fn status(status: u16) -> Self {
		Self::bytes(status, Vec::new())
	}

	/// Replies with `status` and a raw body.
	pub fn bytes(status: u16, body: Vec<u8>) -> Self {
		Self { kind: ReplyKind::Response { status, headers: Vec::new(), body }, delay: None }
	}

	/// Fails the request with a transport-level network error.
	pub fn network_error() -> Self {
		Self { kind: ReplyKind::NetworkError, delay: None }
	}

	/// Adds a response header. Ignored for network errors.
	pub fn header(mut self, name: &str, value: &str) -> Self {
		if let ReplyKind::Response { headers, .. } = &mut self.kind {
			headers.push((name.to_owned(), value.to_owned()));
		}

		self
	}

	/// Delays the reply by `delay` of real time.
	pub fn delayed(mut self, delay: std::time::Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	fn materialize(&self) -> Result<HttpResponse, TransportError> {
		match &self.kind {
			ReplyKind::Response { status, headers, body } => {
				let mut response = HttpResponse::new(body.clone());

				*response.status_mut() =
					StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

				for (name, value) in headers {
					if let (Ok(name), Ok(value)) =
						(HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str()))
					{
						response.headers_mut().append(name, value);
					}
				}

				Ok(response)
			},
			ReplyKind::NetworkError => Err(TransportError::Io(std::io::Error::new(
				std::io::ErrorKind::ConnectionReset,
				"scripted network failure",
			))),
		}
	}
}

/// Request observed by a [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	/// HTTP method.
	pub method: String,
	/// Full request URI including the query string.
	pub uri: String,
	/// Request headers as lowercase name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl RecordedRequest {
	/// Returns the first value of header `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Body decoded as UTF-8, lossily.
	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

#[derive(Debug)]
struct Route {
	pattern: String,
	replies: VecDeque<Reply>,
	calls: usize,
}

/// Scripted transport that matches requests to routes by URI substring.
///
/// Routes are checked in registration order and the first whose pattern occurs in the request
/// URI answers. Each route pops its replies in order and repeats the final one forever.
/// Requests that match no route receive `404`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
	routes: Mutex<Vec<Route>>,
	log: Mutex<Vec<RecordedRequest>>,
}
impl ScriptedTransport {
	/// Creates a transport with no routes.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers (or extends) the route for `pattern` with `replies`.
	pub fn route<I>(&self, pattern: &str, replies: I) -> &Self
	where
		I: IntoIterator<Item = Reply>,
	{
		let mut routes = self.routes.lock();

		match routes.iter_mut().find(|route| route.pattern == pattern) {
			Some(route) => route.replies.extend(replies),
			None => routes.push(Route {
				pattern: pattern.to_owned(),
				replies: replies.into_iter().collect(),
				calls: 0,
			}),
		}

		self
	}

	/// Number of requests answered by the route registered as `pattern`.
	pub fn calls(&self, pattern: &str) -> usize {
		self.routes
			.lock()
			.iter()
			.find(|route| route.pattern == pattern)
			.map(|route| route.calls)
			.unwrap_or_default()
	}

	/// Total number of requests received, matched or not.
	pub fn total_calls(&self) -> usize {
		self.log.lock().len()
	}

	/// Every request received so far, in arrival order.
	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.log.lock().clone()
	}

	fn next_reply(&self, uri: &str) -> Option<Reply> {
		let mut routes = self.routes.lock();
		let route = routes.iter_mut().find(|route| uri.contains(&route.pattern))?;

		route.calls += 1;

		if route.replies.len() > 1 {
			route.replies.pop_front()
		} else {
			route.replies.front().cloned()
		}
	}
}
impl Transport for ScriptedTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let uri = request.uri().to_string();
		let recorded = RecordedRequest {
			method: request.method().to_string(),
			uri: uri.clone(),
			headers: request
				.headers()
				.iter()
				.map(|(name, value)| {
					let value = String::from_utf8_lossy(value.as_bytes()).into_owned();

					(name.as_str().to_owned(), value)
				})
				.collect(),
			body: request.body().clone(),
		};

		self.log.lock().push(recorded);

		let reply = self.next_reply(&uri).unwrap_or_else(|| Reply::status(404));

		Box::pin(async move {
			if let Some(delay) = reply.delay {
				tokio::time::sleep(delay).await;
			}

			reply.materialize()
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn get(uri: &str) -> HttpRequest {
		oauth2::http::Request::builder()
			.uri(uri)
			.body(Vec::new())
			.expect("Request fixture should build.")
	}

	#[tokio::test]
	async fn replies_pop_in_order_and_last_is_sticky() {
		let transport = ScriptedTransport::new();

		transport.route("/insights", [Reply::status(500), Reply::status(200)]);

		let mut statuses = Vec::new();

		for _ in 0..3 {
			let response = transport
				.send(get("https://graph.example.com/v21.0/act_1/insights"))
				.await
				.expect("Scripted reply should be a response.");

			statuses.push(response.status().as_u16());
		}

		assert_eq!(statuses, [500, 200, 200]);
		assert_eq!(transport.calls("/insights"), 3);
	}

	#[tokio::test]
	async fn unmatched_requests_get_not_found_and_network_errors_fail() {
		let transport = ScriptedTransport::new();

		transport.route("/down", [Reply::network_error()]);

		let missing =
			transport.send(get("https://x.example.com/other")).await.expect("404 is a response.");

		assert_eq!(missing.status().as_u16(), 404);
		assert!(transport.send(get("https://x.example.com/down")).await.is_err());
		assert_eq!(transport.total_calls(), 2);
		assert_eq!(transport.requests()[1].uri, "https://x.example.com/down");
	}
}
