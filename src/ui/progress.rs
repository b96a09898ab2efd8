use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use uuid::Uuid;

use crate::core::state::DownloadState;
use crate::core::task::{TaskNotification, TaskNotifier};

const TEMPLATE: &str = "{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}";

/// 终端进度条形式的任务通知
pub struct ProgressNotifier {
    multi: MultiProgress,
    bars: Mutex<HashMap<Uuid, ProgressBar>>,
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// 不绘制任何内容，测试与非交互模式使用
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<Uuid, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    /// 当前显示中的进度条数量
    pub fn active(&self) -> usize {
        self.bars().len()
    }

    pub fn position(&self, task_id: &Uuid) -> Option<u64> {
        self.bars().get(task_id).map(|bar| bar.position())
    }
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskNotifier for ProgressNotifier {
    fn update(&self, notification: TaskNotification) {
        let mut bars = self.bars();
        let bar = bars.entry(notification.task_id).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(100));
            bar.set_style(Self::style());
            bar
        });
        bar.set_position(u64::from(notification.percent.min(100)));
        let hint = if notification.cancellable { " (p 暂停)" } else { "" };
        bar.set_message(format!("{}{}", notification.title, hint));
    }

    fn finish(&self, task_id: Uuid, title: &str, state: Option<DownloadState>) {
        let Some(bar) = self.bars().remove(&task_id) else {
            return;
        };
        match state {
            Some(state) => bar.finish_with_message(format!("{} - {}", title, state.describe())),
            None => bar.abandon_with_message(format!("{} - 失败", title)),
        }
    }
}
