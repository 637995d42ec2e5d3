// API client factory
// Builds the per-domain clients that share one cookie jar and one refresh policy

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use reqwest::Client;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::http_client::{ApiClient, ClientConfig};
use crate::session::{SessionEvents, SessionRefresher, SessionSubscription};

/// Backend domains, one client each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Auth,
    Public,
    JobSeeker,
    Recruiter,
    Admin,
    User,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Auth,
        Domain::Public,
        Domain::JobSeeker,
        Domain::Recruiter,
        Domain::Admin,
        Domain::User,
    ];

    pub fn base_path(self) -> &'static str {
        match self {
            Domain::Auth => "/api/auth",
            Domain::Public => "/api/public",
            Domain::JobSeeker => "/api/user/jobseeker",
            Domain::Recruiter => "/api/user/recruiter",
            Domain::Admin => "/api/admin",
            Domain::User => "/api/user/",
        }
    }

    /// Everything but the public domain goes through session refresh
    pub fn is_intercepted(self) -> bool {
        !matches!(self, Domain::Public)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Auth => "auth",
            Domain::Public => "public",
            Domain::JobSeeker => "jobseeker",
            Domain::Recruiter => "recruiter",
            Domain::Admin => "admin",
            Domain::User => "user",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auth" => Ok(Domain::Auth),
            "public" => Ok(Domain::Public),
            "jobseeker" | "job-seeker" | "job_seeker" => Ok(Domain::JobSeeker),
            "recruiter" => Ok(Domain::Recruiter),
            "admin" => Ok(Domain::Admin),
            "user" => Ok(Domain::User),
            other => anyhow::bail!(
                "Unknown domain '{}' (expected auth, public, jobseeker, recruiter, admin or user)",
                other
            ),
        }
    }
}

/// The family of API clients used by the front end
pub struct ApiClients {
    auth: ApiClient,
    public: ApiClient,
    jobseeker: ApiClient,
    recruiter: ApiClient,
    admin: ApiClient,
    user: ApiClient,

    events: SessionEvents,
    refresher: Arc<SessionRefresher>,

    /// Transport that sends cookies from the shared jar
    credentialed: Client,

    /// Transport without a cookie store
    anonymous: Client,
}

impl ApiClients {
    /// Build every domain client for the configured origin
    pub fn new(config: &Config) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let credentialed = build_http_client(config, Some(jar))?;
        let anonymous = build_http_client(config, None)?;
        let events = SessionEvents::new(config.event_capacity);

        let origin = config.api_origin.trim_end_matches('/');
        let client_config =
            |domain: Domain| ClientConfig::new(format!("{}{}", origin, domain.base_path()), true);

        // The refresher sends through the plain public client so the refresh
        // call is never intercepted itself
        let public = ApiClient::new(client_config(Domain::Public), credentialed.clone());
        let refresher = Arc::new(SessionRefresher::new(
            public.clone(),
            events.clone(),
            config.refresh_mode,
        ));

        let intercepted = |domain: Domain| {
            ApiClient::new(client_config(domain), credentialed.clone())
                .with_refresher(refresher.clone())
        };

        let clients = Self {
            auth: intercepted(Domain::Auth),
            jobseeker: intercepted(Domain::JobSeeker),
            recruiter: intercepted(Domain::Recruiter),
            admin: intercepted(Domain::Admin),
            user: intercepted(Domain::User),
            public,
            events,
            refresher,
            credentialed,
            anonymous,
        };

        tracing::info!(
            origin = origin,
            refresh_mode = ?config.refresh_mode,
            "API clients initialized"
        );

        Ok(clients)
    }

    /// Build a client for an arbitrary base address.
    ///
    /// `intercept` attaches the shared session refresher. Clients created
    /// without credentials do not see the shared cookie jar, so they cannot
    /// be intercepted: a refreshed cookie would never reach their replay.
    pub fn create_client(&self, config: ClientConfig, intercept: bool) -> Result<ApiClient> {
        if intercept && !config.with_credentials() {
            anyhow::bail!(
                "Client for {} cannot refresh sessions without credentials",
                config.base_url()
            );
        }

        let http = if config.with_credentials() {
            self.credentialed.clone()
        } else {
            self.anonymous.clone()
        };

        let client = ApiClient::new(config, http);
        if intercept {
            Ok(client.with_refresher(self.refresher.clone()))
        } else {
            Ok(client)
        }
    }

    pub fn auth(&self) -> &ApiClient {
        &self.auth
    }

    pub fn public(&self) -> &ApiClient {
        &self.public
    }

    pub fn jobseeker(&self) -> &ApiClient {
        &self.jobseeker
    }

    pub fn recruiter(&self) -> &ApiClient {
        &self.recruiter
    }

    pub fn admin(&self) -> &ApiClient {
        &self.admin
    }

    pub fn user(&self) -> &ApiClient {
        &self.user
    }

    pub fn for_domain(&self, domain: Domain) -> &ApiClient {
        match domain {
            Domain::Auth => &self.auth,
            Domain::Public => &self.public,
            Domain::JobSeeker => &self.jobseeker,
            Domain::Recruiter => &self.recruiter,
            Domain::Admin => &self.admin,
            Domain::User => &self.user,
        }
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn subscribe(&self) -> SessionSubscription {
        self.events.subscribe()
    }

    pub fn refresher(&self) -> &Arc<SessionRefresher> {
        &self.refresher
    }
}

/// Build a pooled reqwest client, optionally backed by a cookie jar
fn build_http_client(config: &Config, jar: Option<Arc<Jar>>) -> Result<Client> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(config.http_max_connections)
        .connect_timeout(Duration::from_secs(config.http_connect_timeout))
        .timeout(Duration::from_secs(config.http_request_timeout));

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    builder.build().context("Failed to create HTTP client")
}
