mod catalog;
mod config;
mod controller;
mod logging;
mod model;
mod player;
mod view;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use catalog::CatalogClient;
use config::Config;
use controller::AppController;
use model::AppModel;
use player::{PlayerController, RodioOutputFactory};
use view::AppView;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== Tunebox Starting ===");

    let config = Config::load();
    tracing::info!(catalog_url = %config.catalog_url, "configuration loaded");

    let http = reqwest::Client::new();
    let catalog = CatalogClient::new(http.clone(), &config.catalog_url);

    let model = AppModel::new();

    let player = PlayerController::new(Arc::new(RodioOutputFactory::new(http)));
    player.initialize().await;
    player.set_volume(config.volume).await;

    let app_controller = AppController::new(model.clone(), player.clone(), catalog);

    // First catalog fetch before the TUI comes up; failures land in the
    // error overlay rather than aborting startup.
    app_controller.refresh_playlists().await;

    tracing::info!("Starting TUI...");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, model, player.clone(), app_controller).await;

    player.cleanup().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "Application error");
    }

    tracing::info!("Tunebox shutting down");
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    model: AppModel,
    player: PlayerController,
    controller: AppController,
) -> io::Result<()> {
    loop {
        model.auto_clear_old_errors().await;

        let playback = player.snapshot().await;
        let ui_state = model.get_ui_state().await;
        let playlists = model.get_playlists().await;
        let should_quit = model.should_quit().await;

        terminal.draw(|f| {
            AppView::render(f, &playback, &ui_state, &playlists);
        })?;

        // Short poll keeps progress updates smooth between key presses
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                let _ = controller.handle_key_event(key).await;
            }
        }

        if should_quit {
            break;
        }
    }

    Ok(())
}
