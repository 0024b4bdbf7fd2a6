//! Distress messages and the [`NotificationDispatcher`] abstraction over the
//! SMS / push channels.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::{Error, Result, contact::Contact, location::LocationFix};

const MAP_BASE: &str = "https://www.google.com/maps";

// ─── Message ─────────────────────────────────────────────────────────────────

/// A maps URL pointing at `fix`, e.g.
/// `https://www.google.com/maps?q=40.4167754,-3.7037902`.
pub fn map_link(fix: &LocationFix) -> String {
  format!("{MAP_BASE}?q={:.7},{:.7}", fix.latitude, fix.longitude)
}

/// Recover `(latitude, longitude)` from a link produced by [`map_link`].
pub fn parse_map_link(link: &str) -> Result<(f64, f64)> {
  let invalid = || Error::InvalidMapLink(link.to_owned());

  let url = Url::parse(link).map_err(|_| invalid())?;
  if url.host_str() != Some("www.google.com") || url.path() != "/maps" {
    return Err(invalid());
  }

  let (_, q) = url
    .query_pairs()
    .find(|(k, _)| k == "q")
    .ok_or_else(invalid)?;
  let (lat, lon) = q.split_once(',').ok_or_else(invalid)?;
  let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
  let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;

  if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
    return Err(invalid());
  }
  Ok((lat, lon))
}

/// Render the text sent to every emergency contact.
pub fn distress_message(
  prefix: &str,
  subject_name: &str,
  fix: &LocationFix,
  sent_at: DateTime<Utc>,
) -> String {
  format!(
    "{prefix} {subject_name} needs help. Live location: {}. Sent at {}.",
    map_link(fix),
    sent_at.to_rfc3339_opts(SecondsFormat::Secs, true),
  )
}

// ─── Delivery ────────────────────────────────────────────────────────────────

/// Per-recipient outcome of one fan-out. Both lists keep fan-out order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
  pub delivered: Vec<Uuid>,
  pub failed:    Vec<Uuid>,
}

impl DeliveryReport {
  /// Every recipient received the message.
  pub fn is_complete(&self) -> bool { self.failed.is_empty() }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the messaging channels (SMS gateway, push dispatcher).
pub trait NotificationDispatcher: Send + Sync {
  /// Send `message` to every contact in one fan-out.
  ///
  /// Per-recipient failures belong in the returned [`DeliveryReport`]. An
  /// `Err` means the channel itself is unusable and must be
  /// [`Error::ChannelUnavailable`].
  fn notify<'a>(
    &'a self,
    contacts: &'a [Contact],
    message: &'a str,
  ) -> impl Future<Output = Result<DeliveryReport>> + Send + 'a;

  /// Show a confirmation on the subject's own device once the alert is out.
  fn confirm_local<'a>(
    &'a self,
    _title: &'a str,
    _body: &'a str,
  ) -> impl Future<Output = Result<()>> + Send + 'a {
    async { Ok(()) }
  }
}
