use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};

use crate::config::HarvestConfig;
use crate::error::HarvestError;

/// Anything below this is an error page or a stub, never a real PDF.
pub const MIN_FILE_BYTES: u64 = 100;

pub trait Fetcher: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String, HarvestError>;

    /// Streams the body of `url` into `destination`, returning the byte count.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, HarvestError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after the given failed attempt (1-based): base, 2x base, 4x base...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, url: &str, mut op: F) -> Result<T, HarvestError>
    where
        F: FnMut(u32) -> Result<T, HarvestError>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "attempt {attempt}/{} for {url} failed: {err}; retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::error!("giving up on {url} after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Keeps a randomized gap between consecutive requests.
#[derive(Debug)]
pub struct RequestPacer {
    min_delay: Duration,
    max_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            last_request: Mutex::new(None),
        }
    }

    pub fn next_gap(&self) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        Duration::from_millis(millis)
    }

    pub fn wait(&self) {
        let gap = self.next_gap();
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < gap {
                thread::sleep(gap - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    pacer: RequestPacer,
}

impl HttpFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("jacow-harvester/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/pdf,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| HarvestError::Http {
                url: config.base_url.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            retry: RetryPolicy::new(config.max_retries, config.backoff_base),
            pacer: RequestPacer::new(config.min_delay, config.max_delay),
        })
    }

    fn send(&self, url: &str) -> Result<Response, HarvestError> {
        self.pacer.wait();
        let response = self.client.get(url).send().map_err(|err| HarvestError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Self::handle_status(url, response)
    }

    fn handle_status(url: &str, response: Response) -> Result<Response, HarvestError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(HarvestError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String, HarvestError> {
        self.retry.run(url, |_| {
            let response = self.send(url)?;
            response.text().map_err(|err| HarvestError::Http {
                url: url.to_string(),
                message: err.to_string(),
            })
        })
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, HarvestError> {
        self.retry.run(url, |_| {
            let mut response = self.send(url)?;
            check_content_type(url, &response)?;
            if let Some(length) = response.content_length() {
                if length < MIN_FILE_BYTES {
                    return Err(HarvestError::TooSmall {
                        url: url.to_string(),
                        bytes: length,
                    });
                }
            }
            let mut file = File::create(destination)
                .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", destination.display())))?;
            let written = copy_body(url, &mut response, &mut file, destination)?;
            if written < MIN_FILE_BYTES {
                return Err(HarvestError::TooSmall {
                    url: url.to_string(),
                    bytes: written,
                });
            }
            Ok(written)
        })
    }
}

/// Error and login pages come back as `200 text/html`; only PDF or opaque
/// binary bodies are worth keeping. A missing header is let through.
fn check_content_type(url: &str, response: &Response) -> Result<(), HarvestError> {
    let Some(value) = response.headers().get(CONTENT_TYPE) else {
        return Ok(());
    };
    let content_type = value.to_str().unwrap_or_default().to_ascii_lowercase();
    if is_pdf_content_type(&content_type) {
        return Ok(());
    }
    Err(HarvestError::NotPdf {
        url: url.to_string(),
        content_type,
    })
}

fn is_pdf_content_type(content_type: &str) -> bool {
    content_type.contains("pdf") || content_type.starts_with("application/octet-stream")
}

/// Read failures are network errors (retryable), write failures are not.
fn copy_body<R: Read, W: Write>(
    url: &str,
    reader: &mut R,
    writer: &mut W,
    destination: &Path,
) -> Result<u64, HarvestError> {
    let mut buffer = [0u8; 8192];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buffer).map_err(|err| HarvestError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", destination.display())))?;
        written += read as u64;
    }
    writer
        .flush()
        .map_err(|err| HarvestError::Filesystem(format!("{}: {err}", destination.display())))?;
    Ok(written)
}
