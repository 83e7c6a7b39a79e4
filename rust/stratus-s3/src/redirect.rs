use std::future::Future;

use tracing::debug;

use crate::S3Error;

/// Re-issue an exchange against the endpoints named by temporary redirects.
///
/// `send` is called with the host to talk to, starting with `origin`. Each
/// temporary redirect counts as one hop; the redirect that would take hop
/// `max_hops + 1` fails with [`S3Error::TooManyRedirects`] instead of being
/// followed. A redirect to an empty endpoint or back to the current host
/// fails with [`S3Error::InvalidRedirect`].
pub async fn follow<T, F, Fut>(origin: &str, max_hops: u32, mut send: F) -> Result<T, S3Error>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, S3Error>>,
{
    let mut host = origin.to_string();
    let mut hops = 0;

    loop {
        let endpoint = match send(host.clone()).await {
            Err(S3Error::TemporaryRedirect { endpoint }) => endpoint,
            result => return result,
        };

        if endpoint.is_empty() || endpoint == host {
            return Err(S3Error::InvalidRedirect { endpoint });
        }

        hops += 1;
        if hops > max_hops {
            return Err(S3Error::TooManyRedirects { hops });
        }

        debug!(from = %host, to = %endpoint, hops, "Following temporary redirect");
        host = endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn it_follows_a_redirect_to_a_new_host() {
        let hosts = Mutex::new(Vec::new());
        let result = follow("photos.s3.amazonaws.com", 5, |host| {
            hosts.lock().push(host.clone());
            async move {
                if host == "photos.s3.amazonaws.com" {
                    Err(S3Error::TemporaryRedirect {
                        endpoint: "photos.s3-eu-west-1.amazonaws.com".into(),
                    })
                } else {
                    Ok(host)
                }
            }
        })
        .await;

        assert_eq!(result, Ok("photos.s3-eu-west-1.amazonaws.com".to_string()));
        assert_eq!(hosts.lock().len(), 2);
    }

    #[tokio::test]
    async fn it_rejects_a_redirect_to_the_same_host() {
        let calls = Mutex::new(0);
        let result: Result<(), S3Error> = follow("photos.s3.amazonaws.com", 5, |host| {
            *calls.lock() += 1;
            async move { Err(S3Error::TemporaryRedirect { endpoint: host }) }
        })
        .await;

        assert_eq!(
            result,
            Err(S3Error::InvalidRedirect {
                endpoint: "photos.s3.amazonaws.com".into()
            })
        );
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn it_rejects_a_redirect_without_an_endpoint() {
        let result: Result<(), S3Error> = follow("photos.s3.amazonaws.com", 5, |_| async {
            Err(S3Error::TemporaryRedirect {
                endpoint: String::new(),
            })
        })
        .await;

        assert_eq!(
            result,
            Err(S3Error::InvalidRedirect {
                endpoint: String::new()
            })
        );
    }

    #[tokio::test]
    async fn it_stops_at_the_sixth_consecutive_redirect() {
        let calls = Mutex::new(0u32);
        let result: Result<(), S3Error> = follow("host-0", 5, |_| {
            let call = {
                let mut calls = calls.lock();
                *calls += 1;
                *calls
            };
            async move {
                Err(S3Error::TemporaryRedirect {
                    endpoint: format!("host-{}", call),
                })
            }
        })
        .await;

        assert_eq!(result, Err(S3Error::TooManyRedirects { hops: 6 }));
        assert_eq!(*calls.lock(), 6);
    }

    #[tokio::test]
    async fn it_passes_other_failures_through() {
        let result: Result<(), S3Error> = follow("host", 5, |_| async {
            Err(S3Error::PermanentRedirect {
                endpoint: "elsewhere".into(),
            })
        })
        .await;

        assert_eq!(
            result,
            Err(S3Error::PermanentRedirect {
                endpoint: "elsewhere".into()
            })
        );
    }
}
