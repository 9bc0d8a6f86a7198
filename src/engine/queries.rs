use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::expiry::view;
use super::{Engine, EngineError};

impl ReservationFilter {
    fn wants_key(&self, key: &SlotKey) -> bool {
        self.resource_id.is_none_or(|id| id == key.resource_id)
            && self.date_from.is_none_or(|from| key.date >= from)
            && self.date_to.is_none_or(|to| key.date <= to)
    }
}

fn validate_page(page: PageRequest) -> Result<(), EngineError> {
    if page.page == 0 {
        return Err(EngineError::validation("page must be at least 1"));
    }
    if page.page_size == 0 || page.page_size > MAX_PAGE_SIZE {
        return Err(EngineError::validation(format!(
            "pageSize must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}

fn matches_search(r: &Reservation, needle: &str) -> bool {
    r.requester_name.to_lowercase().contains(needle)
        || r
            .notes
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(needle))
}

impl Engine {
    pub async fn get_reservation(&self, id: Ulid, now: NaiveDateTime) -> Result<ReservationView, EngineError> {
        let key = self
            .index
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        let shared = self
            .get_ledger(&key)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        let ledger = shared.read().await;
        let reservation = ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        Ok(view(reservation, now))
    }

    /// Filtered, paginated listing ordered by date, start time, then id.
    ///
    /// The status filter applies to the displayed status at `now`, so `expired`
    /// selects elapsed approvals and `approved` excludes them. `total` counts
    /// every match before pagination; a page past the end is empty, not an error.
    pub async fn query(
        &self,
        filter: &ReservationFilter,
        page: PageRequest,
        now: NaiveDateTime,
    ) -> Result<Page<ReservationView>, EngineError> {
        validate_page(page)?;
        let needle = match filter.search.as_deref().map(str::trim) {
            Some(s) if s.chars().count() > MAX_SEARCH_LEN => {
                return Err(EngineError::validation(format!(
                    "search exceeds {MAX_SEARCH_LEN} characters"
                )));
            }
            Some(s) if !s.is_empty() => Some(s.to_lowercase()),
            _ => None,
        };

        let ledgers: Vec<_> = self
            .ledgers
            .iter()
            .filter(|e| filter.wants_key(e.key()))
            .map(|e| e.value().clone())
            .collect();

        let mut matched = Vec::new();
        for shared in ledgers {
            let ledger = shared.read().await;
            for r in &ledger.reservations {
                if let Some(needle) = &needle
                    && !matches_search(r, needle)
                {
                    continue;
                }
                let v = view(r.clone(), now);
                if filter.status.is_none_or(|s| s == v.display_status) {
                    matched.push(v);
                }
            }
        }
        matched.sort_by(|a, b| {
            let (a, b) = (&a.reservation, &b.reservation);
            (a.date, a.span.start, a.id).cmp(&(b.date, b.span.start, b.id))
        });

        let total = matched.len();
        let skip = (page.page - 1).saturating_mul(page.page_size);
        let items = matched.into_iter().skip(skip).take(page.page_size).collect();
        Ok(Page {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Free windows of a resource on `date`: operating hours minus blocking reservations.
    pub async fn availability(&self, resource_id: ResourceId, date: NaiveDate) -> Result<Vec<TimeSpan>, EngineError> {
        let info = self
            .catalog
            .resource(resource_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("resource {resource_id}")))?;
        let key = SlotKey { resource_id, date };
        let windows = match self.get_ledger(&key) {
            Some(shared) => {
                let ledger = shared.read().await;
                free_windows(Some(&*ledger), info.open_time, info.close_time)
            }
            None => free_windows(None, info.open_time, info.close_time),
        };
        Ok(windows)
    }
}
