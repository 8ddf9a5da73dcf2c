use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use vidchat::panel::{ChatTurn, PanelPhase, PanelSnapshot, Role};
use vidchat::{
    Coordinator, MessageBus, PageEvent, PageObserver, PanelController, PanelRuntime,
    SettingsStore, SimulatedBrowser,
};
use vidchat_answer::HttpAnswerService;
use vidchat_protocol::WindowId;

const STARTUP_WAIT: Duration = Duration::from_secs(2);

/// Ask questions about a video from a simulated browser session.
///
/// The first URL is loaded in a fresh tab, the rest are applied as in-page navigations.
/// Each stdin line is then asked as a question about the current video.
#[derive(Debug, Parser)]
#[command(name = "vidchat")]
#[command(about = "Chat about the video playing in a simulated browser tab")]
struct Cli {
    /// Answering service base URL; saved to the settings file for later runs
    #[arg(long)]
    api_base_url: Option<String>,

    /// Window handle the tab opens in
    #[arg(long, default_value_t = WindowId::new(1))]
    window: WindowId,

    /// Page to open, followed by in-page navigations
    #[arg(required = true)]
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let Some((first_url, later_urls)) = cli.urls.split_first() else {
        return ExitCode::from(2);
    };

    let store = SettingsStore::load();
    if let Some(api_base_url) = &cli.api_base_url {
        if let Err(error) = store.save_api_base_url(api_base_url.clone()) {
            tracing::warn!(error = %error, path = ?store.config_path(), "failed to save base URL");
        }
    }
    let settings = store.settings();
    let service = match HttpAnswerService::new(settings.api_base_url.clone()) {
        Ok(service) => Arc::new(service),
        Err(error) => {
            tracing::error!(error = %error, "failed to create answering client");
            return ExitCode::FAILURE;
        }
    };
    match service.health().await {
        Ok(health) if health.is_ok() => {
            tracing::info!(base_url = service.base_url(), "answering service is healthy");
        }
        Ok(health) => {
            tracing::warn!(status = %health.status, message = %health.message, "answering service reports a problem");
        }
        Err(error) => {
            tracing::warn!(error = %error, "answering service is unreachable; questions will fail");
        }
    }

    let bus = Arc::new(MessageBus::new());
    let (browser, host_events) = SimulatedBrowser::new(bus.clone());
    let coordinator = Coordinator::new(browser.clone(), bus.clone()).start(host_events);

    let tab = browser.open_tab(cli.window, first_url.clone());
    let observer = PageObserver::new(tab.origin(), tab.url.clone(), bus.clone()).attach();
    let panel = PanelRuntime::attach(
        tab.id,
        PanelController::new(settings.texts()),
        bus.clone(),
        browser.clone(),
        service,
        settings.banner_duration(),
    );
    observer.send(PageEvent::Loaded);

    for url in later_urls {
        browser.push_state(tab.id, url.clone());
        observer.send(PageEvent::DomMutated { url: url.clone() });
    }

    let active = tokio::time::timeout(
        STARTUP_WAIT,
        panel.wait_for(|snapshot| snapshot.phase.is_active()),
    )
    .await;
    if !matches!(active, Ok(Some(_))) {
        tracing::warn!(url = %first_url, "no video detected; questions will be rejected");
    }

    let mut transcript = Transcript::default();
    transcript.print(&panel.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(error = %error, "failed to read question");
                break;
            }
        };

        let before = panel.snapshot().completed_submissions;
        if !panel.submit(line) {
            break;
        }
        let Some(snapshot) = panel
            .wait_for(|snapshot| snapshot.completed_submissions > before)
            .await
        else {
            break;
        };

        transcript.print(&snapshot);
        if let Some(banner) = &snapshot.banner {
            println!("[!] {}", banner.message);
        }
    }

    panel.detach().await;
    observer.detach().await;
    coordinator.shutdown().await;
    ExitCode::SUCCESS
}

/// Tracks which turns of the panel conversation were already printed.
#[derive(Debug, Default)]
struct Transcript {
    phase: PanelPhase,
    shown: usize,
}

impl Transcript {
    /// Lines for the turns not shown yet. A phase change means the conversation was
    /// reseeded, so it is shown again from the greeting.
    fn pending_lines(&mut self, snapshot: &PanelSnapshot) -> Vec<String> {
        if snapshot.phase != self.phase || snapshot.turns.len() < self.shown {
            self.phase = snapshot.phase.clone();
            self.shown = 0;
        }

        let lines = snapshot.turns[self.shown..]
            .iter()
            .map(format_turn)
            .collect();
        self.shown = snapshot.turns.len();
        lines
    }

    fn print(&mut self, snapshot: &PanelSnapshot) {
        for line in self.pending_lines(snapshot) {
            println!("{line}");
        }
    }
}

fn format_turn(turn: &ChatTurn) -> String {
    let speaker = match turn.role() {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    format!("{speaker}> {}", turn.text())
}
