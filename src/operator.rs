use std::sync::Arc;

use chrono::NaiveDate;

use crate::engine::{DayLoad, Engine};
use crate::model::{Appointment, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized;

impl std::fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operator access required")
    }
}

impl std::error::Error for Unauthorized {}

/// Read-only views for the configured operator.
pub struct OperatorDesk {
    engine: Arc<Engine>,
    operator: Option<UserId>,
}

impl OperatorDesk {
    pub fn new(engine: Arc<Engine>, operator: Option<UserId>) -> Self {
        Self { engine, operator }
    }

    pub fn is_operator(&self, actor: UserId) -> bool {
        self.operator == Some(actor)
    }

    fn check(&self, actor: UserId) -> Result<(), Unauthorized> {
        if self.is_operator(actor) { Ok(()) } else { Err(Unauthorized) }
    }

    pub async fn all_bookings(&self, actor: UserId) -> Result<Vec<Appointment>, Unauthorized> {
        self.check(actor)?;
        Ok(self.engine.all().await)
    }

    pub async fn bookings_on(
        &self,
        actor: UserId,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, Unauthorized> {
        self.check(actor)?;
        Ok(self.engine.on_date(date).await)
    }

    /// The next bookable days with their raw booking counts.
    pub async fn days_overview(
        &self,
        actor: UserId,
        today: NaiveDate,
    ) -> Result<Vec<DayLoad>, Unauthorized> {
        self.check(actor)?;
        Ok(self.engine.operator_days(today).await)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;
    use crate::model::{Name, NewAppointment, Phone};

    #[tokio::test]
    async fn operator_views() {
        let dir = std::env::temp_dir().join("weekslot_test_operator");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("operator_views.wal");
        let _ = std::fs::remove_file(&path);
        let engine = Arc::new(Engine::open(path).unwrap());
        let desk = OperatorDesk::new(engine.clone(), Some(99));

        let today = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let now = today.and_hms_opt(9, 0, 0).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        for (user, hour) in [(1, 15), (2, 11)] {
            let request = NewAppointment {
                user_id: user,
                date: monday,
                time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                name: Name::parse("Anna").unwrap(),
                phone: Phone::parse("+37369123456").unwrap(),
            };
            engine.book(request, now).await.unwrap();
        }

        assert_eq!(desk.all_bookings(1).await, Err(Unauthorized));
        assert_eq!(desk.days_overview(1, today).await, Err(Unauthorized));

        let on_monday = desk.bookings_on(99, monday).await.unwrap();
        let hours: Vec<_> = on_monday.iter().map(|a| a.time.format("%H").to_string()).collect();
        assert_eq!(hours, ["11", "15"]);
        assert_eq!(desk.all_bookings(99).await.unwrap(), on_monday);

        let overview = desk.days_overview(99, today).await.unwrap();
        assert_eq!(overview.len(), 7);
        assert!(overview.contains(&DayLoad { date: monday, booked: 2 }));
        assert!(overview.iter().filter(|d| d.date != monday).all(|d| d.booked == 0));
    }
}
