// In-memory transport for tests
//
// Routes are keyed by (method, url). Unknown routes answer 404 with an empty
// body. Every request and every connect is recorded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use parking_lot::Mutex;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

#[derive(Debug, Clone)]
enum MockRoute {
	Respond(HttpResponse),
	Pending,
	Fail(String),
}

/// A request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
	pub destination: String,
	pub request: HttpRequest,
}

#[derive(Debug, Default)]
pub struct MockTransport {
	routes: Mutex<HashMap<(Method, String), MockRoute>>,
	requests: Mutex<Vec<RecordedRequest>>,
	unreachable: Mutex<HashSet<String>>,
	connects: AtomicUsize,
	connect_delay: Option<Duration>,
}

impl MockTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Delay every connect, widening race windows in concurrency tests
	pub fn with_connect_delay(mut self, delay: Duration) -> Self {
		self.connect_delay = Some(delay);
		self
	}

	pub fn with_response(self, method: Method, url: &str, status: u16, body: impl Into<String>) -> Self {
		self.routes
			.lock()
			.insert((method, url.to_string()), MockRoute::Respond(HttpResponse::new(status, body)));
		self
	}

	pub fn with_json(self, method: Method, url: &str, body: serde_json::Value) -> Self {
		self.with_response(method, url, 200, body.to_string())
	}

	/// A route that never answers
	pub fn with_pending(self, method: Method, url: &str) -> Self {
		self.routes
			.lock()
			.insert((method, url.to_string()), MockRoute::Pending);
		self
	}

	/// A route that fails at the transport level
	pub fn with_failure(self, method: Method, url: &str, message: &str) -> Self {
		self.routes
			.lock()
			.insert((method, url.to_string()), MockRoute::Fail(message.to_string()));
		self
	}

	pub fn with_unreachable_destination(self, destination: &str) -> Self {
		self.unreachable.lock().insert(destination.to_string());
		self
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().clone()
	}

	pub fn request_urls(&self) -> Vec<String> {
		self.requests.lock().iter().map(|r| r.request.url.clone()).collect()
	}

	pub fn connect_count(&self) -> usize {
		self.connects.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl HttpTransport for MockTransport {
	async fn connect(&self, destination: &str) -> Result<(), TransportError> {
		self.connects.fetch_add(1, Ordering::SeqCst);
		if let Some(delay) = self.connect_delay {
			tokio::time::sleep(delay).await;
		}
		if self.unreachable.lock().contains(destination) {
			return Err(TransportError::Request(format!("connection refused: {}", destination)));
		}
		Ok(())
	}

	async fn send(&self, destination: &str, request: HttpRequest) -> Result<HttpResponse, TransportError> {
		let route = self
			.routes
			.lock()
			.get(&(request.method.clone(), request.url.clone()))
			.cloned();
		self.requests.lock().push(RecordedRequest {
			destination: destination.to_string(),
			request,
		});

		match route {
			Some(MockRoute::Respond(response)) => Ok(response),
			Some(MockRoute::Pending) => futures::future::pending().await,
			Some(MockRoute::Fail(message)) => Err(TransportError::Request(message)),
			None => Ok(HttpResponse::new(404, "")),
		}
	}
}
