use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use crossterm::{
    cursor, execute, terminal,
    event::{self, Event, KeyCode},
};
use futures::future::join_all;
use log::{error, info, warn};
use uuid::Uuid;

use magnetdown::cli::{self, Command};
use magnetdown::core::scheduler::WorkState;
use magnetdown::core::task::source::HttpInspector;
use magnetdown::core::task::{SilentNotifier, TaskNotifier};
use magnetdown::core::{DownloadError, DownloadManager, DownloadResult};
use magnetdown::engine::loopback::{LoopbackEngine, LoopbackOptions};
use magnetdown::engine::{EngineSession, SessionSettings, TorrentEngine};
use magnetdown::ui::{self, FileTable, ProgressNotifier, RecordTable};
use magnetdown::utils::logger::init_logger;

const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 未接入真实引擎时的占位，任何会话都会启动失败
struct NoEngine;

#[async_trait]
impl TorrentEngine for NoEngine {
    async fn open_session(
        &self,
        _settings: SessionSettings,
        _warm_state: Option<Bytes>,
    ) -> DownloadResult<Box<dyn EngineSession>> {
        Err(DownloadError::Engine(
            "此构建未包含 BitTorrent 引擎，请使用 --loopback 运行演示".to_string(),
        ))
    }
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // 解析参数和配置
    let (args, config) = match cli::Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(1);
        }
    };

    init_logger(&config.log_level, &config.log_file, config.log_max_size)
        .with_context(|| format!("无法初始化日志: {}", config.log_file))?;
    info!("程序启动，配置文件: {}", args.config);
    info!("配置摘要:\n{}", config.get_summary());

    let engine: Arc<dyn TorrentEngine> = if args.loopback {
        Arc::new(LoopbackEngine::new(LoopbackOptions::default()))
    } else {
        Arc::new(NoEngine)
    };
    let interactive = matches!(args.command, Some(Command::Add { .. }) | Some(Command::Resume { .. }));
    let notifier: Arc<dyn TaskNotifier> = if interactive {
        Arc::new(ProgressNotifier::new())
    } else {
        Arc::new(SilentNotifier)
    };
    let inspector = Arc::new(HttpInspector {
        user_agent: config.client_id.clone(),
    });
    let manager = DownloadManager::open(config, engine, notifier, inspector)
        .context("无法打开下载管理器")?;

    match args.command.clone() {
        None | Some(Command::List) => {
            let records = manager.list_records().await?;
            let statuses = manager.statuses().borrow().clone();
            print!("{}", RecordTable { records: &records, statuses: &statuses });
        }
        Some(Command::Add { .. }) => {
            let links = args.get_links()?;
            let results = join_all(links.iter().map(|link| manager.start(link))).await;
            let mut tasks = Vec::new();
            for (link, result) in links.iter().zip(results) {
                match result {
                    Ok(task_id) => {
                        ui::print_success(&format!("已添加: {}", link));
                        tasks.push((task_id, link.clone()));
                    }
                    Err(e) => {
                        error!("添加失败 [{}]: {}", link, e);
                        ui::print_error(&format!("添加失败: {} - {}", link, e));
                    }
                }
            }
            if tasks.is_empty() {
                eprintln!("没有可下载的任务");
                return Ok(());
            }
            run_download_loop(&manager, &tasks).await?;
        }
        Some(Command::Resume { link }) => {
            let task_id = find_task(&manager, &link).await?;
            manager.resume(task_id, &link).await?;
            ui::print_success(&format!("已继续: {}", link));
            run_download_loop(&manager, &[(task_id, link)]).await?;
        }
        Some(Command::Pause { link }) => {
            let task_id = find_task(&manager, &link).await?;
            manager.pause(task_id, &link).await?;
            ui::print_success(&format!("已暂停: {}", link));
        }
        Some(Command::Delete { link }) => {
            let task_id = find_task(&manager, &link).await?;
            manager.delete(task_id, &link).await?;
            ui::print_success(&format!("已删除: {}", link));
        }
        Some(Command::Files { link }) => {
            let files = manager.files(&link).await?;
            print!("{}", FileTable(&files));
        }
    }

    Ok(())
}

async fn find_task(manager: &DownloadManager, link: &str) -> anyhow::Result<Uuid> {
    manager
        .task_id_of(link)
        .await?
        .with_context(|| format!("没有该链接的下载记录: {}", link))
}

/// 显示进度直到所有任务结束；`p` 暂停全部，`q` 暂停并退出
async fn run_download_loop(manager: &DownloadManager, tasks: &[(Uuid, String)]) -> anyhow::Result<()> {
    println!("\n开始下载... (按 'p' 暂停, 'q' 退出)");
    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), cursor::Hide)?;

    loop {
        if let Ok(true) = event::poll(KEYBOARD_POLL_INTERVAL) {
            if let Ok(Event::Key(key_event)) = event::read() {
                match key_event.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => {
                        info!("用户退出");
                        manager.shutdown().await;
                        break;
                    }
                    KeyCode::Char('p') | KeyCode::Char('P') => {
                        for (task_id, link) in tasks {
                            if let Err(e) = manager.pause(*task_id, link).await {
                                warn!("暂停失败 [{}]: {}", link, e);
                            }
                        }
                        info!("用户暂停所有任务");
                    }
                    _ => {}
                }
            }
        }

        let finished = tasks
            .iter()
            .all(|(task_id, _)| !matches!(manager.task_state(task_id), Some(WorkState::Running)));
        if finished {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    execute!(std::io::stdout(), cursor::Show)?;
    terminal::disable_raw_mode()?;

    println!("\n下载统计:");
    for (task_id, link) in tasks {
        match manager.task_state(task_id) {
            Some(WorkState::Finished(state)) => println!("  {} {}", state.describe(), link),
            Some(WorkState::Failed(message)) => println!("  失败 {} - {}", link, message),
            _ => println!("  未知 {}", link),
        }
    }
    Ok(())
}
