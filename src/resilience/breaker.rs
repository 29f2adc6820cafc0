//! Circuit breaker state machine keyed by (organization, platform).

// self
use crate::{
	_prelude::*,
	auth::Platform,
	clock::Clock,
	config::{BreakerConfig, ClientConfig},
	obs,
	store::CredentialKey,
};

/// Breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
	/// Requests pass through; failures are counted within a fixed window.
	Closed,
	/// Requests are rejected without a network call until the cooldown elapses.
	Open,
	/// A single probe request decides whether the breaker closes again.
	HalfOpen,
}
impl CircuitState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CircuitState::Closed => "closed",
			CircuitState::Open => "open",
			CircuitState::HalfOpen => "half_open",
		}
	}
}
impl Display for CircuitState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Read-only view of a breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerSnapshot {
	/// Current state.
	pub state: CircuitState,
	/// Failures counted in the current window.
	pub failures: u32,
	/// Start of the current failure-counting window.
	pub window_started_at: OffsetDateTime,
	/// Instant the breaker last opened.
	pub opened_at: Option<OffsetDateTime>,
	/// Cooldown applied the next time the breaker is Open.
	pub cooldown: Duration,
}

/// Returned by [`CircuitBreaker::try_acquire`] while requests are not admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Circuit is open; retry in {retry_in}.")]
pub struct BreakerRejection {
	/// Time left until a probe is admitted; zero while a probe is in flight.
	pub retry_in: Duration,
}

#[derive(Debug)]
struct BreakerCore {
	state: CircuitState,
	failures: u32,
	window_started_at: OffsetDateTime,
	opened_at: Option<OffsetDateTime>,
	cooldown: Duration,
	probe_in_flight: bool,
}

type Transition = Option<(CircuitState, CircuitState)>;

/// Circuit breaker for one platform connection.
#[derive(Debug)]
pub struct CircuitBreaker {
	platform: Platform,
	config: BreakerConfig,
	clock: Arc<dyn Clock>,
	core: Mutex<BreakerCore>,
}
impl CircuitBreaker {
	/// Creates a Closed breaker.
	pub fn new(platform: Platform, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
		let core = BreakerCore {
			state: CircuitState::Closed,
			failures: 0,
			window_started_at: clock.now(),
			opened_at: None,
			cooldown: config.cooldown(),
			probe_in_flight: false,
		};

		Self { platform, config, clock, core: Mutex::new(core) }
	}

	/// Asks for permission to send one request.
	///
	/// Closed admits everything. Open rejects until `opened_at + cooldown`, after which the
	/// breaker turns HalfOpen and the caller receives the single probe permit.
	pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, BreakerRejection> {
		let now = self.clock.now();
		let (admitted, transition) = {
			let mut core = self.core.lock();

			match core.state {
				CircuitState::Closed => (Ok(false), None),
				CircuitState::Open => {
					let reopens_at = core.opened_at.unwrap_or(now) + core.cooldown;

					if now >= reopens_at {
						core.state = CircuitState::HalfOpen;
						core.probe_in_flight = true;

						(Ok(true), Some((CircuitState::Open, CircuitState::HalfOpen)))
					} else {
						(Err(BreakerRejection { retry_in: reopens_at - now }), None)
					}
				},
				CircuitState::HalfOpen if core.probe_in_flight =>
					(Err(BreakerRejection { retry_in: Duration::ZERO }), None),
				CircuitState::HalfOpen => {
					core.probe_in_flight = true;

					(Ok(true), None)
				},
			}
		};

		self.emit(transition);

		admitted.map(|probe| BreakerPermit { breaker: self.clone(), probe, settled: false })
	}

	/// Current state without side effects.
	pub fn snapshot(&self) -> BreakerSnapshot {
		let core = self.core.lock();

		BreakerSnapshot {
			state: core.state,
			failures: core.failures,
			window_started_at: core.window_started_at,
			opened_at: core.opened_at,
			cooldown: core.cooldown,
		}
	}

	/// Platform the breaker guards.
	pub fn platform(&self) -> Platform {
		self.platform
	}

	fn on_success(&self, probe: bool) {
		let now = self.clock.now();
		let transition = {
			let mut core = self.core.lock();

			match core.state {
				CircuitState::HalfOpen if probe => {
					core.state = CircuitState::Closed;
					core.failures = 0;
					core.window_started_at = now;
					core.opened_at = None;
					core.cooldown = self.config.cooldown();
					core.probe_in_flight = false;

					Some((CircuitState::HalfOpen, CircuitState::Closed))
				},
				CircuitState::Closed => {
					core.failures = 0;
					core.window_started_at = now;

					None
				},
				_ => None,
			}
		};

		self.emit(transition);
	}

	fn on_failure(&self, probe: bool) {
		let now = self.clock.now();
		let transition = {
			let mut core = self.core.lock();

			match core.state {
				CircuitState::HalfOpen if probe => {
					let doubled =
						core.cooldown.checked_mul(2).unwrap_or(self.config.max_cooldown());

					core.cooldown = doubled.min(self.config.max_cooldown());

					Self::open(&mut core, now, CircuitState::HalfOpen)
				},
				CircuitState::Closed => {
					if now - core.window_started_at >= self.config.window() {
						core.failures = 0;
						core.window_started_at = now;
					}

					core.failures = core.failures.saturating_add(1);

					if core.failures > self.config.failure_threshold {
						Self::open(&mut core, now, CircuitState::Closed)
					} else {
						None
					}
				},
				_ => None,
			}
		};

		self.emit(transition);
	}

	fn on_soft_failure(&self, probe: bool) {
		let now = self.clock.now();
		let transition = {
			let mut core = self.core.lock();

			if probe && core.state == CircuitState::HalfOpen {
				Self::open(&mut core, now, CircuitState::HalfOpen)
			} else {
				None
			}
		};

		self.emit(transition);
	}

	fn on_release(&self, probe: bool) {
		if probe {
			let mut core = self.core.lock();

			if core.state == CircuitState::HalfOpen {
				core.probe_in_flight = false;
			}
		}
	}

	fn open(core: &mut BreakerCore, now: OffsetDateTime, from: CircuitState) -> Transition {
		core.state = CircuitState::Open;
		core.opened_at = Some(now);
		core.probe_in_flight = false;

		Some((from, CircuitState::Open))
	}

	fn emit(&self, transition: Transition) {
		if let Some((from, to)) = transition {
			obs::trace_breaker_transition(self.platform, from, to);
			obs::record_breaker_transition(self.platform, to);
		}
	}
}

/// Admission ticket for one request.
///
/// The holder reports exactly one outcome. Dropping an unsettled permit releases a probe slot
/// without recording anything, which is what caller cancellation relies on.
#[derive(Debug)]
pub struct BreakerPermit {
	breaker: Arc<CircuitBreaker>,
	probe: bool,
	settled: bool,
}
impl BreakerPermit {
	/// Whether this request is the HalfOpen probe.
	pub fn is_probe(&self) -> bool {
		self.probe
	}

	/// Reports a healthy response.
	pub fn success(mut self) {
		self.settled = true;
		self.breaker.on_success(self.probe);
	}

	/// Reports a server error, network failure, or attempt timeout.
	pub fn failure(mut self) {
		self.settled = true;
		self.breaker.on_failure(self.probe);
	}

	/// Reports throttling; it reopens a HalfOpen breaker but never counts toward the threshold.
	pub fn soft_failure(mut self) {
		self.settled = true;
		self.breaker.on_soft_failure(self.probe);
	}

	/// Settles without a health signal.
	pub fn release(mut self) {
		self.settled = true;
		self.breaker.on_release(self.probe);
	}
}
impl Drop for BreakerPermit {
	fn drop(&mut self) {
		if !self.settled {
			self.breaker.on_release(self.probe);
		}
	}
}

/// Lazily populated breakers, one per (organization, platform).
#[derive(Debug)]
pub struct BreakerRegistry {
	configs: HashMap<Platform, BreakerConfig>,
	clock: Arc<dyn Clock>,
	breakers: Mutex<HashMap<CredentialKey, Arc<CircuitBreaker>>>,
}
impl BreakerRegistry {
	/// Creates an empty registry using the per-platform thresholds from `config`.
	pub fn new(config: &ClientConfig, clock: Arc<dyn Clock>) -> Self {
		let configs =
			Platform::ALL.into_iter().map(|platform| (platform, config.platform(platform).breaker));

		Self { configs: configs.collect(), clock, breakers: Default::default() }
	}

	/// Returns the breaker for `key`, creating a Closed one on first use.
	pub fn get(&self, key: &CredentialKey) -> Arc<CircuitBreaker> {
		let mut breakers = self.breakers.lock();

		breakers
			.entry(key.clone())
			.or_insert_with(|| {
				let config = self.configs.get(&key.platform).copied().unwrap_or_default();

				Arc::new(CircuitBreaker::new(key.platform, config, self.clock.clone()))
			})
			.clone()
	}

	/// Snapshot of an existing breaker; `None` when the connection never made a call.
	pub fn snapshot(&self, key: &CredentialKey) -> Option<BreakerSnapshot> {
		let breaker = self.breakers.lock().get(key).cloned()?;

		Some(breaker.snapshot())
	}
}
