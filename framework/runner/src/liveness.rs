use std::time::{Duration, Instant};

use ureq::Agent;

#[derive(Debug, thiserror::Error)]
pub enum LivenessError {
    #[error("'{url}' did not respond with 200 OK within {waited:?}, last result: {last}")]
    Timeout {
        url: String,
        waited: Duration,
        last: String,
    },
}

/// Polls an HTTP endpoint until it answers `200 OK`.
///
/// Sends a form-encoded POST when form fields are set and a GET otherwise. Each request is bounded
/// by its own timeout and the whole wait by a deadline.
#[derive(Debug, Clone)]
pub struct LivenessProbe {
    url: String,
    form: Vec<(String, String)>,
    interval: Duration,
    deadline: Duration,
    request_timeout: Duration,
}

impl LivenessProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            form: Vec::new(),
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(120),
            request_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_form(mut self, form: Vec<(String, String)>) -> Self {
        self.form = form;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Block until the endpoint is live or the deadline passes.
    pub fn wait_until_live(&self) -> Result<(), LivenessError> {
        let agent: Agent = ureq::config::Config::builder()
            .timeout_global(Some(self.request_timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();

        let start = Instant::now();
        let mut polls = 0u32;
        loop {
            polls += 1;
            let last = match self.poll(&agent) {
                Ok(200) => {
                    log::info!(
                        "[liveness] {} is live after {polls} poll(s) in {:?}",
                        self.url,
                        start.elapsed()
                    );
                    return Ok(());
                }
                Ok(status) => format!("HTTP {status}"),
                Err(e) => e.to_string(),
            };
            log::debug!("[liveness] {} not live yet: {last}", self.url);

            let waited = start.elapsed();
            if waited + self.interval > self.deadline {
                return Err(LivenessError::Timeout {
                    url: self.url.clone(),
                    waited,
                    last,
                });
            }
            std::thread::sleep(self.interval);
        }
    }

    fn poll(&self, agent: &Agent) -> Result<u16, ureq::Error> {
        let response = if self.form.is_empty() {
            agent.get(&self.url).call()?
        } else {
            agent
                .post(&self.url)
                .send_form(self.form.iter().map(|(k, v)| (k.as_str(), v.as_str())))?
        };
        Ok(response.status().as_u16())
    }
}
