use crate::backend::{BackendClient, BackendError};
use crate::config::{SimConfig, SubmitErrorPolicy};
use crate::models::{Device, NewDevice, Reading};
use chrono::Utc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::future::Future;
use thiserror::Error;
use tokio::time::sleep;

pub mod generator;

pub use generator::PowerGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    NotRegistered,
    Registered,
    Emitting,
    Stopped,
}

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("unable to set up the backend client: {0}")]
    Setup(#[source] BackendError),
    #[error("no two decimal power value fits into {min}..={max}")]
    WattRange { min: f64, max: f64 },
    #[error("device registration failed: {0}")]
    Registration(#[source] BackendError),
    #[error("reading {iteration} could not be delivered: {source}")]
    Submission { iteration: u32, source: BackendError },
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// None if the run was stopped before the device got registered
    pub device_id: Option<String>,
    pub sent: u32,
    pub failed: u32,
    pub interrupted: bool,
}

impl RunSummary {
    fn new(device_id: Option<String>) -> Self {
        return RunSummary { device_id, sent: 0, failed: 0, interrupted: false };
    }
}

pub struct Simulator<R: Rng = StdRng> {
    config: SimConfig,
    backend: BackendClient,
    generator: PowerGenerator<R>,
    state: SimulationState,
}

impl Simulator<StdRng> {
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        let generator = PowerGenerator::new(config.min_watts, config.max_watts)
            .ok_or(SimulationError::WattRange { min: config.min_watts, max: config.max_watts })?;
        return Simulator::with_generator(config, generator);
    }
}

impl<R: Rng> Simulator<R> {
    pub fn with_generator(config: SimConfig, generator: PowerGenerator<R>) -> Result<Self, SimulationError> {
        let backend = BackendClient::new(&config.backend_url, config.request_timeout())
            .map_err(SimulationError::Setup)?;
        return Ok(Simulator {
            config,
            backend,
            generator,
            state: SimulationState::NotRegistered,
        });
    }

    pub fn state(&self) -> SimulationState {
        return self.state;
    }

    fn set_state(&mut self, state: SimulationState) {
        debug!("Simulation state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Register the device, then send the configured number of readings.
    ///
    /// `shutdown` is raced against every request and every pause; once it
    /// resolves no further reading is sent and the run ends without error.
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<RunSummary, SimulationError> {
        tokio::pin!(shutdown);

        let request = NewDevice::new(&self.config.device_name, &self.config.location);
        info!("Registering device {} ({}) at {}", request.name, request.location, self.config.backend_url);

        let registered = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            res = self.backend.register_device(&request) => Some(res),
        };

        let device = match registered {
            None => {
                info!("Stopped simulation");
                self.set_state(SimulationState::Stopped);
                let mut summary = RunSummary::new(None);
                summary.interrupted = true;
                return Ok(summary);
            },
            Some(Err(e)) => {
                self.set_state(SimulationState::Stopped);
                return Err(SimulationError::Registration(e));
            },
            Some(Ok(device)) => device,
        };

        match device.created_at {
            Some(ts) => info!("Device created: {} at {}", device.id, ts),
            None => info!("Device created: {}", device.id),
        }
        self.set_state(SimulationState::Registered);

        let summary = self.emit(&device, &mut shutdown).await;
        self.set_state(SimulationState::Stopped);
        return summary;
    }

    async fn emit<F: Future<Output = ()>>(&mut self, device: &Device, shutdown: &mut std::pin::Pin<&mut F>) -> Result<RunSummary, SimulationError> {
        let mut summary = RunSummary::new(Some(device.id.clone()));
        let total = self.config.count;
        let delay = self.config.delay();

        if total > 0 {
            self.set_state(SimulationState::Emitting);
        }

        for i in 1..=total {
            let watts = self.generator.next_watts();
            let mut reading = Reading::new(device, watts);
            if self.config.send_timestamp {
                reading = reading.with_timestamp(Utc::now());
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.as_mut() => {
                    summary.interrupted = true;
                    break;
                },
                res = self.submit_with_retry(&reading) => res,
            };

            match outcome {
                Ok(()) => {
                    summary.sent += 1;
                    info!("Sent reading {i}/{total}: {watts} W");
                },
                Err(e) => {
                    summary.failed += 1;
                    match self.config.on_submit_error {
                        SubmitErrorPolicy::Ignore => debug!("Reading {i}/{total} not delivered: {e}"),
                        SubmitErrorPolicy::Log => warn!("Reading {i}/{total} not delivered: {e}"),
                        SubmitErrorPolicy::Abort => {
                            return Err(SimulationError::Submission { iteration: i, source: e });
                        }
                    }
                }
            }

            /* No pause after the last reading */
            if i < total && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = shutdown.as_mut() => {
                        summary.interrupted = true;
                        break;
                    },
                    _ = sleep(delay) => {},
                }
            }
        }

        if summary.interrupted {
            info!("Stopped simulation");
        } else {
            info!("Simulation finished, {} of {} readings delivered", summary.sent, total);
        }
        return Ok(summary);
    }

    async fn submit_with_retry(&self, reading: &Reading) -> Result<(), BackendError> {
        let retries = self.config.submit_retries;
        let mut attempt = 0;
        loop {
            match self.backend.submit_reading(reading).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    debug!("Submitting reading failed ({e}), retry {attempt}/{retries}");
                    sleep(self.config.retry_delay()).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
