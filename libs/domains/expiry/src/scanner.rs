//! Pure threshold evaluation over a client snapshot. No I/O.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use strum::IntoEnumIterator;

use crate::config::Thresholds;
use crate::error::{ExpiryError, ExpiryResult};
use crate::models::{Client, ExpiryEvent, ServiceType, parse_expiry_date};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days from `now` until the start (00:00 UTC) of `expiry`, rounded up.
///
/// Any instant on the expiry date itself yields 0.
pub fn days_until(expiry: NaiveDate, now: DateTime<Utc>) -> i64 {
    let expiry_start = expiry.and_time(NaiveTime::MIN).and_utc();
    let millis = (expiry_start - now).num_milliseconds();
    let days = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

/// Event for one parsed expiry date, if a threshold band is due.
pub fn evaluate(
    client_id: &str,
    service_type: ServiceType,
    expiry_date: NaiveDate,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Option<ExpiryEvent> {
    let days = days_until(expiry_date, now);
    let threshold_day = thresholds.select(days)?;
    // select() bounds days to 0..=max threshold
    let days_until_expiry = i32::try_from(days).ok()?;

    Some(ExpiryEvent {
        client_id: client_id.to_string(),
        service_type,
        expiry_date,
        threshold_day,
        days_until_expiry,
    })
}

/// Due events for every service on `client`, at most one per service.
///
/// An unparsable date yields an `Err` entry for that service only; services
/// without a date yield nothing.
pub fn scan(
    client: &Client,
    now: DateTime<Utc>,
    thresholds: &Thresholds,
) -> Vec<ExpiryResult<ExpiryEvent>> {
    ServiceType::iter()
        .filter_map(|service| {
            let raw = client.expiry_raw(service)?;
            match parse_expiry_date(raw) {
                Some(date) => evaluate(&client.id, service, date, now, thresholds).map(Ok),
                None => Some(Err(ExpiryError::InvalidExpiryDate {
                    client_id: client.id.clone(),
                    service,
                    value: raw.to_string(),
                })),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    fn date_in(days: i64) -> String {
        (now().date_naive() + Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn thresholds_of(events: &[ExpiryResult<ExpiryEvent>]) -> Vec<(ServiceType, i32)> {
        events
            .iter()
            .filter_map(|e| e.as_ref().ok())
            .map(|e| (e.service_type, e.threshold_day))
            .collect()
    }

    #[test]
    fn test_days_until_rounds_up() {
        let today = now().date_naive();
        assert_eq!(days_until(today, now()), 0);
        assert_eq!(days_until(today + Duration::days(1), now()), 1);
        assert_eq!(days_until(today - Duration::days(3), now()), -3);

        let midnight = today.and_time(NaiveTime::MIN).and_utc();
        assert_eq!(days_until(today + Duration::days(9), midnight), 9);
        assert_eq!(
            days_until(today + Duration::days(9), midnight + Duration::milliseconds(1)),
            9
        );
    }

    #[test]
    fn test_nine_days_maps_to_seven() {
        let client = Client::new("c1", "Acme", "a@acme.test").with_domain_expiry(date_in(9));
        let events = scan(&client, now(), &Thresholds::default());

        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.threshold_day, 7);
        assert_eq!(event.days_until_expiry, 9);
        assert_eq!(event.service_type, ServiceType::Domain);
    }

    #[test]
    fn test_expiry_today_maps_to_zero() {
        let client = Client::new("c1", "Acme", "a@acme.test").with_hosting_expiry(date_in(0));
        let events = scan(&client, now(), &Thresholds::default());
        assert_eq!(thresholds_of(&events), vec![(ServiceType::Hosting, 0)]);
    }

    #[test]
    fn test_expired_and_too_early_yield_nothing() {
        let client = Client::new("c1", "Acme", "a@acme.test")
            .with_domain_expiry(date_in(-3))
            .with_hosting_expiry(date_in(45));
        assert!(scan(&client, now(), &Thresholds::default()).is_empty());
    }

    #[test]
    fn test_both_services_evaluated_independently() {
        let client = Client::new("c1", "Acme", "a@acme.test")
            .with_domain_expiry(date_in(5))
            .with_hosting_expiry(date_in(14));
        let events = scan(&client, now(), &Thresholds::default());
        assert_eq!(
            thresholds_of(&events),
            vec![(ServiceType::Domain, 1), (ServiceType::Hosting, 14)]
        );
    }

    #[test]
    fn test_malformed_date_only_affects_its_service() {
        let client = Client::new("c1", "Acme", "a@acme.test")
            .with_domain_expiry("31/12/2026")
            .with_hosting_expiry(date_in(1));
        let events = scan(&client, now(), &Thresholds::default());

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            Err(ExpiryError::InvalidExpiryDate { service: ServiceType::Domain, .. })
        ));
        assert_eq!(thresholds_of(&events), vec![(ServiceType::Hosting, 1)]);
    }

    #[test]
    fn test_rfc3339_dates_accepted() {
        let expiry = (now() + Duration::days(7)).to_rfc3339();
        let client = Client::new("c1", "Acme", "a@acme.test").with_domain_expiry(expiry);
        let events = scan(&client, now(), &Thresholds::default());
        assert_eq!(thresholds_of(&events), vec![(ServiceType::Domain, 7)]);
    }

    #[test]
    fn test_no_dates_no_events() {
        let client = Client::new("c1", "Acme", "a@acme.test");
        assert!(scan(&client, now(), &Thresholds::default()).is_empty());
    }
}
