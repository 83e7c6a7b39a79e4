use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use stratus_signer::{Credentials, SigningKey, normalize_region, v4};
use tracing::info;

use crate::S3Error;

/// Everything needed to sign one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signing {
    /// Legacy signing with the raw secret key
    Legacy,
    /// SigV4 with the key for the current day
    V4 {
        /// Signing region
        region: String,
        /// Key derived for `region` and the current UTC date
        key: SigningKey,
    },
}

#[derive(Debug)]
struct KeyState {
    region: String,
    date: String,
    key: SigningKey,
}

/// The signing key of a bucket session together with the date and region
/// it was derived for.
///
/// The key is never handed out on its own: [`KeyCell::signing`] checks the
/// date and re-derives the key under the lock when the UTC day has changed.
#[derive(Debug)]
pub struct KeyCell {
    credentials: Credentials,
    service: String,
    state: Mutex<Option<KeyState>>,
}

impl KeyCell {
    /// An empty cell; [`KeyCell::signing`] fails until a region is set.
    pub fn new(credentials: Credentials, service: impl Into<String>) -> Self {
        Self {
            credentials,
            service: service.into(),
            state: Mutex::new(None),
        }
    }

    /// Credentials the cell derives keys from.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Signing service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region the current key is derived for.
    pub fn region(&self) -> Option<String> {
        self.state.lock().as_ref().map(|state| state.region.clone())
    }

    /// Adopt `region` and derive a key for it at `now`.
    pub fn set_region(&self, region: &str, now: &DateTime<Utc>) {
        let region = normalize_region(region);
        let date = v4::format_date(now);
        let key = SigningKey::derive(
            self.credentials.secret_access_key(),
            &date,
            &region,
            &self.service,
        );

        let mut state = self.state.lock();
        info!(region = %region, "Signing for region");
        *state = Some(KeyState { region, date, key });
    }

    /// SigV4 material for a request signed at `now`.
    pub fn signing(&self, now: &DateTime<Utc>) -> Result<Signing, S3Error> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(S3Error::Uninitialized)?;

        let today = v4::format_date(now);
        if state.date != today {
            info!(region = %state.region, date = %today, "Rotating signing key");
            state.key = SigningKey::derive(
                self.credentials.secret_access_key(),
                &today,
                &state.region,
                &self.service,
            );
            state.date = today;
        }

        Ok(Signing::V4 {
            region: state.region.clone(),
            key: state.key.clone(),
        })
    }
}
