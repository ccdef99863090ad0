//! `vidup check <path>` – quota admission only; nothing is uploaded.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use vidup_core::config::VidupConfig;
use vidup_core::quota::server::ServerQuota;
use vidup_core::quota::{admit, Admission, QuotaSnapshot, UNLIMITED};
use vidup_core::{QuotaSource, StaticToken, UploadFile};

use super::{curl_transport, mib};
use crate::cli::ServerArgs;

pub async fn run_check(cfg: &VidupConfig, path: &Path, server: &ServerArgs) -> Result<()> {
    let server_url = server.server_url(cfg)?;
    let auth = Arc::new(match server.token.clone() {
        Some(t) => StaticToken::new(t),
        None => StaticToken::anonymous(),
    });
    let quota = ServerQuota::new(curl_transport(cfg), auth, &server_url)?;

    let file = UploadFile::open(path, None)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let usage = quota.current_usage().await.context("read quota usage")?;
    let limits = quota.fetch_limits().await.context("read account limits")?;
    let snapshot = QuotaSnapshot::new(usage, limits);

    println!("{:<8} {:>12} {:>12}", "QUOTA", "USED MiB", "LIMIT MiB");
    println!("{:<8} {:>12.1} {:>12}", "total", mib_signed(snapshot.used), limit_str(snapshot.limit));
    println!("{:<8} {:>12.1} {:>12}", "daily", mib_signed(snapshot.used_daily), limit_str(snapshot.limit_daily));

    match admit(file.size(), &snapshot) {
        Admission::Admitted => {
            println!("{} ({:.1} MiB) fits.", file.name(), mib(file.size()));
            Ok(())
        }
        Admission::Rejected(reason) => bail!("{} ({:.1} MiB): {}", file.name(), mib(file.size()), reason),
    }
}

fn mib_signed(bytes: i64) -> f64 {
    bytes as f64 / 1_048_576.0
}

fn limit_str(limit: i64) -> String {
    if limit <= UNLIMITED {
        "unlimited".to_string()
    } else {
        format!("{:.1}", mib_signed(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_limits_print_as_unlimited() {
        assert_eq!(limit_str(-1), "unlimited");
        assert_eq!(limit_str(1_048_576 * 3), "3.0");
    }
}
