//! 안전망 재확인 스케줄러
//!
//! 낙관적 이동 뒤 확인 알림이 끝내 오지 않는 경우를 대비해, 일정 시간 후
//! 미러를 서버 상태와 다시 맞추는 작업을 예약합니다. 실패한 새로고침은
//! 정해진 횟수까지만 재시도합니다.

use tokio::time::{Duration, Instant};

use crate::mirror::state::Followup;
use crate::mirror::types::Location;

/// 서버에서 다시 가져올 대상
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Refresh {
    Listing(Location),
    Count(String),
    Categories,
}

impl From<Followup> for Refresh {
    fn from(followup: Followup) -> Self {
        match followup {
            Followup::FetchEntry { location, .. } => Refresh::Listing(location),
            Followup::ReconcileCount(category) => Refresh::Count(category),
            Followup::RefreshCategories => Refresh::Categories,
        }
    }
}

impl Refresh {
    fn retarget(&mut self, old: &str, new: &str) {
        match self {
            Refresh::Listing(location) => location.retarget(old, new),
            Refresh::Count(category) if category == old => *category = new.to_string(),
            _ => {}
        }
    }
}

/// 마감 시각에 실행할 재확인 작업
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// 단일 이동: 확인 알림이 왔는지, 원본에 파일이 남아 있는지 확인
    Move {
        file_name: String,
        from: Location,
        to: Location,
    },
    /// 일괄 이동: 원본과 대상 스코프를 함께 확인
    Batch {
        from: Location,
        to: Location,
        files: Vec<String>,
    },
    /// 이름 변경 단계 알림 정리
    Rename {
        location: Location,
        old: String,
        new: String,
    },
    /// 실패한 새로고침 재시도
    Retry { refresh: Refresh, attempt: u32 },
}

impl Check {
    fn retarget(&mut self, old: &str, new: &str) {
        match self {
            Check::Move { from, to, .. } | Check::Batch { from, to, .. } => {
                from.retarget(old, new);
                to.retarget(old, new);
            }
            Check::Rename { location, .. } => location.retarget(old, new),
            Check::Retry { refresh, .. } => refresh.retarget(old, new),
        }
    }
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    check: Check,
}

#[derive(Debug)]
pub struct Scheduler {
    delay: Duration,
    max_retries: u32,
    queue: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new(delay: Duration, max_retries: u32) -> Self {
        Self {
            delay,
            max_retries,
            queue: Vec::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 기본 지연 후 실행되도록 예약합니다.
    pub fn schedule(&mut self, check: Check) {
        let due = Instant::now() + self.delay;
        self.queue.push(Scheduled { due, check });
    }

    /// 실패한 새로고침을 재시도 예약합니다. 한도를 넘으면 false를 반환합니다.
    pub fn schedule_retry(&mut self, refresh: Refresh, failed_attempt: u32) -> bool {
        let attempt = failed_attempt + 1;
        if attempt > self.max_retries {
            return false;
        }
        // 이미 같은 대상이 대기 중이면 중복 예약하지 않음
        let pending = self
            .queue
            .iter()
            .any(|s| matches!(&s.check, Check::Retry { refresh: r, .. } if *r == refresh));
        if !pending {
            self.schedule(Check::Retry { refresh, attempt });
        }
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.iter().map(|s| s.due).min()
    }

    /// `now` 시점까지 마감된 작업을 예약 순서대로 꺼냅니다.
    pub fn take_due(&mut self, now: Instant) -> Vec<Check> {
        let mut due: Vec<Scheduled> = Vec::new();
        let mut remaining = Vec::with_capacity(self.queue.len());
        for scheduled in self.queue.drain(..) {
            if scheduled.due <= now {
                due.push(scheduled);
            } else {
                remaining.push(scheduled);
            }
        }
        self.queue = remaining;
        due.sort_by_key(|s| s.due);
        due.into_iter().map(|s| s.check).collect()
    }

    /// 카테고리 이름 변경을 대기 중인 작업에 반영합니다.
    pub fn retarget_category(&mut self, old: &str, new: &str) {
        for scheduled in &mut self.queue {
            scheduled.check.retarget(old, new);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn move_check(name: &str) -> Check {
        Check::Move {
            file_name: name.to_string(),
            from: Location::Unsorted,
            to: Location::category("Trips"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_become_due_after_delay() {
        let mut scheduler = Scheduler::new(Duration::from_millis(500), 3);
        scheduler.schedule(move_check("a.jpg"));

        assert!(scheduler.take_due(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_millis(499)).await;
        assert!(scheduler.take_due(Instant::now()).is_empty());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(scheduler.take_due(Instant::now()), vec![move_check("a.jpg")]);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_checks_keep_schedule_order() {
        let mut scheduler = Scheduler::new(Duration::from_millis(100), 3);
        scheduler.schedule(move_check("first.jpg"));
        tokio::time::advance(Duration::from_millis(10)).await;
        scheduler.schedule(move_check("second.jpg"));

        assert_eq!(scheduler.next_deadline().map(|d| d <= Instant::now() + Duration::from_millis(90)), Some(true));
        tokio::time::advance(Duration::from_millis(200)).await;
        let due = scheduler.take_due(Instant::now());
        assert_eq!(due, vec![move_check("first.jpg"), move_check("second.jpg")]);
    }

    #[test]
    fn test_retries_are_bounded_and_deduplicated() {
        let mut scheduler = Scheduler::new(Duration::from_millis(500), 2);
        let refresh = Refresh::Count("Trips".into());

        assert!(scheduler.schedule_retry(refresh.clone(), 0));
        assert!(scheduler.schedule_retry(refresh.clone(), 0));
        assert_eq!(scheduler.len(), 1);

        assert!(scheduler.schedule_retry(refresh.clone(), 1));
        assert!(!scheduler.schedule_retry(refresh, 2));
    }

    #[test]
    fn test_retarget_category() {
        let mut scheduler = Scheduler::new(Duration::from_millis(500), 3);
        scheduler.schedule(move_check("a.jpg"));
        scheduler.schedule(Check::Retry {
            refresh: Refresh::Count("Trips".into()),
            attempt: 1,
        });
        scheduler.retarget_category("Trips", "Travel");

        let checks: Vec<Check> = scheduler.queue.iter().map(|s| s.check.clone()).collect();
        assert!(checks.contains(&Check::Move {
            file_name: "a.jpg".into(),
            from: Location::Unsorted,
            to: Location::category("Travel"),
        }));
        assert!(checks.contains(&Check::Retry {
            refresh: Refresh::Count("Travel".into()),
            attempt: 1,
        }));
    }
}
