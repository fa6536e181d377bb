//! Command handlers. Output goes to the supplied writer; diagnostics go
//! through `tracing`.

use crate::config::Config;
use crate::session::SessionChannel;
use anyhow::{bail, Context as _, Result};
use facegate_core::{
    Authenticator, CaptureOutcome, CaptureReport, Enrollment, IdentityStore, Registration,
    ScanOutcome, SubmitError, DESCRIPTOR_DIM, MATCH_THRESHOLD,
};
use facegate_store::{SqliteIdentityStore, SqliteMedium};
use std::io::{Read, Write};

/// Everything a command needs: the identity store and the session channel.
pub struct Context {
    pub config: Config,
    pub store: SqliteIdentityStore,
    pub session: SessionChannel,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let medium = SqliteMedium::open(&config.db_path, config.busy_timeout())
            .with_context(|| format!("opening identity store {}", config.db_path.display()))?;
        let session = SessionChannel::open(&config.session_dir).with_context(|| {
            format!("opening session directory {}", config.session_dir.display())
        })?;
        Ok(Self {
            config,
            store: SqliteIdentityStore::new(medium),
            session,
        })
    }
}

/// Read a capture report from a file, or stdin for `-`.
pub fn read_capture(source: &str) -> Result<CaptureOutcome> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading capture report from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading capture report {source}"))?
    };
    let report: CaptureReport = serde_json::from_str(&raw).context("parsing capture report")?;
    Ok(report.into())
}

pub fn scan(ctx: &Context, capture: CaptureOutcome, out: &mut impl Write) -> Result<()> {
    match Authenticator::new(&ctx.store).scan(capture) {
        ScanOutcome::CaptureFailed(reason) => {
            writeln!(out, "{reason}")?;
            bail!("capture failed: {reason:?}");
        }
        ScanOutcome::Authenticated(identity) => {
            ctx.session.sign_in(&identity)?;
            writeln!(out, "Welcome back, {}!", identity.username())?;
        }
        ScanOutcome::Unrecognized(enrollment) => {
            let Some(pending) = enrollment.pending() else {
                bail!("enrollment lost its pending descriptor");
            };
            ctx.session.stage_pending(pending)?;
            writeln!(
                out,
                "New face detected! Complete registration with `facegate register --username <name> --email <address>`."
            )?;
        }
    }
    Ok(())
}

pub fn register(ctx: &Context, form: &Registration, out: &mut impl Write) -> Result<()> {
    let Some(pending) = ctx.session.pending()? else {
        bail!("no face capture is pending; run `facegate scan` first");
    };
    let preview = pending.preview.clone();
    let mut enrollment = Enrollment::resume(pending).context("pending descriptor is unusable")?;

    match enrollment.submit(&ctx.store, form) {
        Ok(identity) => {
            ctx.session.clear_pending()?;
            ctx.session.sign_in(&identity)?;
            writeln!(
                out,
                "Welcome aboard, {}! Your face has been registered.",
                identity.username()
            )?;
            if let Some(preview) = preview {
                writeln!(out, "Profile image: {preview}")?;
            }
            Ok(())
        }
        Err(SubmitError::Validation(errors)) => {
            for (field, message) in errors.messages() {
                writeln!(out, "{field}: {message}")?;
            }
            bail!("registration rejected");
        }
        Err(err) => Err(err.into()),
    }
}

pub fn cancel(ctx: &Context, out: &mut impl Write) -> Result<()> {
    match ctx.session.pending()? {
        Some(pending) => {
            let mut enrollment = Enrollment::resume(pending)?;
            enrollment.cancel()?;
            ctx.session.clear_pending()?;
            writeln!(out, "Registration cancelled.")?;
        }
        None => {
            ctx.session.clear_pending()?;
            writeln!(out, "Nothing to cancel.")?;
        }
    }
    Ok(())
}

pub fn list(ctx: &Context, json: bool, out: &mut impl Write) -> Result<()> {
    let roster = ctx.store.load().context("reading identity store")?;

    if json {
        let rows: Vec<_> = roster
            .identities
            .iter()
            .map(|i| {
                serde_json::json!({
                    "id": i.id(),
                    "username": i.username(),
                    "email": i.email(),
                    "registrationDate": i.registered_at(),
                    "lastLogin": i.last_seen_at(),
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else if roster.identities.is_empty() {
        writeln!(out, "No identities enrolled")?;
    } else {
        for i in &roster.identities {
            writeln!(
                out,
                "{}  {}  <{}>  registered {}  last seen {}",
                i.id(),
                i.username(),
                i.email(),
                i.registered_at().format("%Y-%m-%d"),
                i.last_seen_at().format("%Y-%m-%d %H:%M"),
            )?;
        }
    }

    if roster.rejected > 0 {
        tracing::warn!(rejected = roster.rejected, "stored records failed schema check");
    }
    Ok(())
}

pub fn whoami(ctx: &Context, out: &mut impl Write) -> Result<()> {
    match ctx.session.current()? {
        Some(user) => writeln!(
            out,
            "{} ({}) signed in since {}",
            user.username,
            user.id,
            user.since.format("%Y-%m-%d %H:%M")
        )?,
        None => writeln!(out, "Not signed in")?,
    }
    Ok(())
}

pub fn logout(ctx: &Context, out: &mut impl Write) -> Result<()> {
    if ctx.session.sign_out()? {
        writeln!(out, "Signed out.")?;
    } else {
        writeln!(out, "Not signed in")?;
    }
    Ok(())
}

pub fn status(ctx: &Context, out: &mut impl Write) -> Result<()> {
    let (identities, rejected, store_error) = match ctx.store.load() {
        Ok(roster) => (roster.identities.len(), roster.rejected, None),
        Err(err) => (0, 0, Some(err.to_string())),
    };
    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "db_path": ctx.config.db_path,
        "session_dir": ctx.session.dir(),
        "identities": identities,
        "rejected_records": rejected,
        "store_error": store_error,
        "pending_enrollment": ctx.session.pending()?.is_some(),
        "signed_in": ctx.session.current()?.map(|u| u.username),
        "match_threshold": MATCH_THRESHOLD,
        "descriptor_dim": DESCRIPTOR_DIM,
    });
    writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::{CaptureFailure, Descriptor};
    use std::path::Path;
    use tempfile::TempDir;

    fn context(dir: &Path) -> Context {
        Context::open(Config {
            db_path: dir.join("data/identities.db"),
            session_dir: dir.join("run"),
            busy_timeout_ms: 1000,
        })
        .unwrap()
    }

    fn capture(first: f32) -> CaptureOutcome {
        let mut values = vec![0.2; DESCRIPTOR_DIM];
        values[0] = first;
        CaptureOutcome::Captured {
            descriptor: Descriptor::from_raw(values),
            preview: Some("shot.png".into()),
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_scan_register_then_recognised() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());

        let mut out = Vec::new();
        scan(&ctx, capture(0.0), &mut out).unwrap();
        assert!(output(out).contains("New face detected"));
        assert!(ctx.session.pending().unwrap().is_some());

        let mut out = Vec::new();
        register(&ctx, &Registration::new("alice", "alice@x.com"), &mut out).unwrap();
        let text = output(out);
        assert!(text.contains("Welcome aboard, alice!"));
        assert!(text.contains("Profile image: shot.png"));
        assert!(ctx.session.pending().unwrap().is_none());
        assert_eq!(ctx.session.current().unwrap().unwrap().username, "alice");

        ctx.session.sign_out().unwrap();
        let mut out = Vec::new();
        scan(&ctx, capture(0.2), &mut out).unwrap();
        assert!(output(out).contains("Welcome back, alice!"));
        assert!(ctx.session.current().unwrap().is_some());
    }

    #[test]
    fn test_register_rejection_keeps_pending() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        scan(&ctx, capture(0.0), &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        let result = register(&ctx, &Registration::new("al", "not-an-email"), &mut out);
        assert!(result.is_err());
        let text = output(out);
        assert!(text.contains("username: Username must be at least 3 characters"));
        assert!(text.contains("email: Please enter a valid email address"));
        assert!(ctx.session.pending().unwrap().is_some());
        assert!(ctx.store.list().is_empty());
    }

    #[test]
    fn test_register_without_scan_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let result = register(&ctx, &Registration::new("alice", "alice@x.com"), &mut Vec::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_cancel_then_register_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        scan(&ctx, capture(0.0), &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        cancel(&ctx, &mut out).unwrap();
        assert!(output(out).contains("Registration cancelled."));

        assert!(register(&ctx, &Registration::new("alice", "alice@x.com"), &mut Vec::new()).is_err());
        assert!(ctx.store.list().is_empty());
    }

    #[test]
    fn test_capture_failure_reports_reason() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let mut out = Vec::new();
        let result = scan(
            &ctx,
            CaptureOutcome::Failed(CaptureFailure::MultipleFacesDetected),
            &mut out,
        );
        assert!(result.is_err());
        assert!(output(out).contains("Multiple faces detected"));
        assert!(ctx.session.pending().unwrap().is_none());
    }

    #[test]
    fn test_list_json_omits_descriptors() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        scan(&ctx, capture(0.0), &mut Vec::new()).unwrap();
        register(&ctx, &Registration::new("alice", "alice@x.com"), &mut Vec::new()).unwrap();

        let mut out = Vec::new();
        list(&ctx, true, &mut out).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["username"], "alice");
        assert!(rows[0].get("descriptor").is_none());
    }

    #[test]
    fn test_read_capture_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.json");
        std::fs::write(&path, r#"{"success":false,"reason":"NoFaceDetected"}"#).unwrap();
        let outcome = read_capture(path.to_str().unwrap()).unwrap();
        assert_eq!(outcome, CaptureOutcome::Failed(CaptureFailure::NoFaceDetected));
    }

    #[test]
    fn test_status_reports_counts() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path());
        let mut out = Vec::new();
        status(&ctx, &mut out).unwrap();
        let status: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(status["identities"], 0);
        assert_eq!(status["pending_enrollment"], false);
        assert_eq!(status["descriptor_dim"], 128);
    }
}
