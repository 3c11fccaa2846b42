// src/scheduler/mod.rs

//! 单线程虚拟时钟任务队列。
//!
//! 所有定时行为（横幅轮播、全屏自动关闭、拉取重试、可见性巡检）都登记在这里，
//! 由调用方推进时间来触发。生产环境里由 runtime 把真实流逝的时间喂进来，
//! 测试里直接手动推进，不依赖墙钟。

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::model::ad::AdType;

/// 定时任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// 到期后要执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    RotateBanner,
    DismissFullscreen,
    RetryFetch(AdType),
    CheckVisibility,
}

#[derive(Debug)]
struct Timer {
    task: Task,
    period: Option<Duration>,
    key: (Duration, u64),
}

/// 周期任务的最小间隔，防止零间隔把推进循环卡死
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct Scheduler {
    now: Duration,
    next_id: u64,
    next_seq: u64,
    // (到期时间, 插入序号) -> 句柄；同一时刻按登记顺序触发
    queue: BTreeMap<(Duration, u64), TimerId>,
    timers: HashMap<TimerId, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前虚拟时间（自启动起的偏移）
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn schedule_once(&mut self, delay: Duration, task: Task) -> TimerId {
        self.insert(delay, task, None)
    }

    pub fn schedule_every(&mut self, period: Duration, task: Task) -> TimerId {
        let period = period.max(MIN_PERIOD);
        self.insert(period, task, Some(period))
    }

    /// 取消定时任务，已触发过的一次性任务返回 false
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                self.queue.remove(&timer.key);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// 队首任务的到期时间
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// 弹出一个在 `until` 之前到期的任务，并把时钟拨到它的到期时间。
    /// 周期任务在返回前已经按原节拍重新入队。
    pub fn pop_due(&mut self, until: Duration) -> Option<(TimerId, Task)> {
        let (&key, &id) = self.queue.iter().next()?;
        if key.0 > until {
            return None;
        }
        self.queue.remove(&key);
        self.now = self.now.max(key.0);

        let timer = self.timers.remove(&id)?;
        let task = timer.task;
        if let Some(period) = timer.period {
            let key = (key.0 + period, self.bump_seq());
            self.queue.insert(key, id);
            self.timers.insert(
                id,
                Timer {
                    task,
                    period: Some(period),
                    key,
                },
            );
        }
        Some((id, task))
    }

    /// 所有到期任务处理完之后，把时钟推到 `until`
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    fn insert(&mut self, delay: Duration, task: Task, period: Option<Duration>) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let key = (self.now + delay, self.bump_seq());
        self.queue.insert(key, id);
        self.timers.insert(id, Timer { task, period, key });
        id
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn drain(scheduler: &mut Scheduler, until: Duration) -> Vec<(Duration, Task)> {
        let mut fired = Vec::new();
        while let Some((_, task)) = scheduler.pop_due(until) {
            fired.push((scheduler.now(), task));
        }
        scheduler.settle(until);
        fired
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut s = Scheduler::new();
        s.schedule_once(ms(300), Task::DismissFullscreen);
        s.schedule_once(ms(100), Task::RetryFetch(AdType::Banner));
        s.schedule_once(ms(100), Task::CheckVisibility);

        let fired = drain(&mut s, ms(1000));
        assert_eq!(
            fired,
            vec![
                (ms(100), Task::RetryFetch(AdType::Banner)),
                (ms(100), Task::CheckVisibility),
                (ms(300), Task::DismissFullscreen),
            ]
        );
        assert_eq!(s.now(), ms(1000));
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn nothing_fires_before_deadline() {
        let mut s = Scheduler::new();
        s.schedule_once(ms(500), Task::DismissFullscreen);
        assert!(drain(&mut s, ms(499)).is_empty());
        assert_eq!(s.next_deadline(), Some(ms(500)));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut s = Scheduler::new();
        let id = s.schedule_once(ms(100), Task::DismissFullscreen);
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        assert!(drain(&mut s, ms(1000)).is_empty());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn repeating_timer_keeps_its_beat() {
        let mut s = Scheduler::new();
        let id = s.schedule_every(ms(7000), Task::RotateBanner);
        let fired = drain(&mut s, ms(21_000));
        let times: Vec<_> = fired.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![ms(7000), ms(14_000), ms(21_000)]);
        assert!(s.is_pending(id));
        assert_eq!(s.next_deadline(), Some(ms(28_000)));
    }

    #[test]
    fn delays_are_relative_to_virtual_now() {
        let mut s = Scheduler::new();
        s.settle(ms(1000));
        s.schedule_once(ms(250), Task::CheckVisibility);
        assert_eq!(s.next_deadline(), Some(ms(1250)));
    }

    proptest! {
        #[test]
        fn pops_are_monotonic(delays in prop::collection::vec(0u64..10_000, 1..40)) {
            let mut s = Scheduler::new();
            for d in &delays {
                s.schedule_once(ms(*d), Task::CheckVisibility);
            }
            let fired = drain(&mut s, ms(10_000));
            prop_assert_eq!(fired.len(), delays.len());
            prop_assert!(fired.windows(2).all(|w| w[0].0 <= w[1].0));
        }
    }
}
