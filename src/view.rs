use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph},
    Frame,
};
use ratatui::widgets::Padding;

use crate::model::{ActiveSection, InputMode, PlayerSnapshot, Playlist, TransportState, UiState};

pub struct AppView;

impl AppView {
    pub fn render(
        frame: &mut Frame,
        playback: &PlayerSnapshot,
        ui_state: &UiState,
        playlists: &[Playlist],
    ) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Min(0),    // Main content (playlists + songs)
                Constraint::Length(3), // Progress bar with playback info
            ])
            .split(frame.area());

        Self::render_top_bar(frame, chunks[0], ui_state, playlists);

        Self::render_main_area(frame, chunks[1], ui_state, playlists);

        Self::render_progress_bar(frame, chunks[2], playback);

        // Error notification overlay (if there's an error)
        if ui_state.error_message.is_some() {
            Self::render_error_notification(frame, ui_state);
        }

        if ui_state.show_help_popup {
            Self::render_help_popup(frame);
        }

        if let Some(mode) = ui_state.input_mode {
            Self::render_input_prompt(frame, mode, &ui_state.input_buffer);
        }
    }

    /// Helper to render a scrollable list with proper state management
    fn render_scrollable_list(
        frame: &mut Frame,
        area: Rect,
        items: Vec<ListItem>,
        selected_index: usize,
        block: Block,
    ) {
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default()); // Highlight handled by item styles

        let mut list_state = ListState::default();
        list_state.select(Some(selected_index));

        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_top_bar(frame: &mut Frame, area: Rect, ui_state: &UiState, playlists: &[Playlist]) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(0),     // Title + open playlist
                Constraint::Length(24), // Hint
            ])
            .split(area);

        let open_playlist = ui_state
            .open_playlist
            .as_deref()
            .and_then(|id| playlists.iter().find(|p| p.id == id));

        let title_text = match open_playlist {
            Some(playlist) if !playlist.category.is_empty() => {
                format!("{} · {}", playlist.name, playlist.category)
            }
            Some(playlist) => playlist.name.clone(),
            None => "Pick a playlist to get started".to_string(),
        };

        let title = Paragraph::new(title_text)
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" 🎵 Tunebox ")
                    .padding(Padding::horizontal(1)),
            );
        frame.render_widget(title, chunks[0]);

        let hint = Paragraph::new("? for keybindings")
            .style(Style::default().fg(Color::Cyan))
            .block(Block::default().borders(Borders::ALL).title(" Help "));
        frame.render_widget(hint, chunks[1]);
    }

    fn render_main_area(frame: &mut Frame, area: Rect, ui_state: &UiState, playlists: &[Playlist]) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(30), // Playlists sidebar
                Constraint::Percentage(70), // Songs in the open playlist
            ])
            .split(area);

        Self::render_playlists(frame, chunks[0], ui_state, playlists);
        Self::render_songs(frame, chunks[1], ui_state, playlists);
    }

    fn render_playlists(frame: &mut Frame, area: Rect, ui_state: &UiState, playlists: &[Playlist]) {
        let items: Vec<ListItem> = playlists
            .iter()
            .enumerate()
            .map(|(i, playlist)| {
                let style = if i == ui_state.playlist_selected
                    && ui_state.active_section == ActiveSection::Playlists
                {
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD)
                } else if i == ui_state.playlist_selected {
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };
                let label = if playlist.category.is_empty() {
                    playlist.name.clone()
                } else {
                    format!("{} ({})", playlist.name, playlist.category)
                };
                ListItem::new(label).style(style)
            })
            .collect();

        let border_style = if ui_state.active_section == ActiveSection::Playlists {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(" Playlists ")
            .padding(Padding::horizontal(1))
            .border_style(border_style);

        if items.is_empty() {
            let empty = Paragraph::new("No playlists yet.\n\nPress r to refresh.")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(empty, area);
            return;
        }

        Self::render_scrollable_list(frame, area, items, ui_state.playlist_selected, block);
    }

    fn render_songs(frame: &mut Frame, area: Rect, ui_state: &UiState, playlists: &[Playlist]) {
        let is_focused = ui_state.active_section == ActiveSection::Songs;
        let border_style = if is_focused {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };

        let open_playlist = ui_state
            .open_playlist
            .as_deref()
            .and_then(|id| playlists.iter().find(|p| p.id == id));

        let Some(playlist) = open_playlist else {
            let content = Paragraph::new(
                "Use Tab to switch sections\nUse ↑/↓ to select a playlist\nPress Enter to open it",
            )
            .style(Style::default().fg(Color::DarkGray))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Songs ")
                    .padding(Padding::horizontal(1))
                    .border_style(border_style),
            );
            frame.render_widget(content, area);
            return;
        };

        // Column widths: "#(3)   TITLE   ARTIST" with title getting 55%
        let content_width = area.width.saturating_sub(4) as usize;
        let num_width = 3;
        let remaining_width = content_width.saturating_sub(num_width + 6);
        let title_width = (remaining_width * 55) / 100;
        let artist_width = remaining_width.saturating_sub(title_width);

        // Header row is item 0
        let mut items: Vec<ListItem> = vec![ListItem::new(format!(
            "{:<num_width$}   {:<title_width$}   {:<artist_width$}",
            "#",
            "Title",
            "Artist",
            num_width = num_width,
            title_width = title_width,
            artist_width = artist_width
        ))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))];

        let song_items: Vec<ListItem> = playlist
            .songs
            .iter()
            .enumerate()
            .map(|(i, song)| {
                let style = if i == ui_state.song_selected && is_focused {
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                } else if i == ui_state.song_selected {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };

                let title_str = if song.title.len() > title_width {
                    format!("{:.width$}...", song.title, width = title_width.saturating_sub(3))
                } else {
                    format!("{:<width$}", song.title, width = title_width)
                };

                let artist_str = if song.artist.len() > artist_width {
                    format!("{:.width$}...", song.artist, width = artist_width.saturating_sub(3))
                } else {
                    format!("{:<width$}", song.artist, width = artist_width)
                };

                ListItem::new(format!(
                    "{:<num_width$}   {}   {}",
                    i + 1,
                    title_str,
                    artist_str,
                    num_width = num_width
                ))
                .style(style)
            })
            .collect();

        items.extend(song_items);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", playlist.name))
            .padding(Padding::horizontal(1))
            .border_style(border_style);

        if playlist.songs.is_empty() {
            let empty = Paragraph::new("  This playlist is empty")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(empty, area);
        } else {
            // +1 for the header row
            Self::render_scrollable_list(frame, area, items, ui_state.song_selected + 1, block);
        }
    }

    fn render_progress_bar(frame: &mut Frame, area: Rect, playback: &PlayerSnapshot) {
        let status_text = match (&playback.current_song, playback.transport()) {
            (None, _) => " No song playing".to_string(),
            (Some(song), TransportState::Loading) => {
                format!(" ⏳ {} | {}", song.title, song.artist)
            }
            (Some(song), TransportState::Playing) => {
                format!(" ▶ {} | {}", song.title, song.artist)
            }
            (Some(song), TransportState::Error) => {
                format!(" ✖ {} | {}", song.title, song.artist)
            }
            (Some(song), _) => format!("⏸  {} | {}", song.title, song.artist),
        };

        let volume_text = format!("Vol: {}%", (playback.volume * 100.0).round() as u32);
        let playlist_text = playback
            .current_playlist
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "—".to_string());

        let time_str = format!(
            "{} / {}",
            Self::format_time(playback.progress),
            Self::format_time(playback.duration)
        );

        let progress_ratio = if playback.duration > 0.0 {
            (playback.progress / playback.duration).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let gauge_style = if playback.has_error {
            Style::default().fg(Color::Red)
        } else {
            Style::default().fg(Color::Green)
        };

        let title = format!("{} ", status_text);
        let controls_info = format!(" {} | {} ", playlist_text, volume_text);

        let gauge = Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .title_bottom(Line::from(controls_info).right_aligned()),
            )
            .gauge_style(gauge_style)
            .ratio(progress_ratio)
            .label(time_str);

        frame.render_widget(gauge, area);
    }

    fn format_time(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u64;
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{}:{:02}", minutes, seconds)
    }

    fn render_error_notification(frame: &mut Frame, ui_state: &UiState) {
        if let Some(ref error_msg) = ui_state.error_message {
            let area = frame.area();

            let popup_width = error_msg.len().min(60_usize) as u16 + 4;
            let popup_height = 5;

            let popup_x = area.width.saturating_sub(popup_width) / 2;
            let popup_y = area.height.saturating_sub(popup_height) / 2;

            let popup_area = Rect {
                x: popup_x,
                y: popup_y,
                width: popup_width,
                height: popup_height,
            };

            // Clear the area behind the popup first
            frame.render_widget(Clear, popup_area);

            let error_text = format!("⚠ {}", error_msg);
            let error_widget = Paragraph::new(error_text)
                .style(
                    Style::default()
                        .fg(Color::Red)
                        .add_modifier(Modifier::BOLD),
                )
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Red))
                        .title(" Error ")
                        .style(Style::default().bg(Color::Black)),
                );

            frame.render_widget(error_widget, popup_area);
        }
    }

    fn render_help_popup(frame: &mut Frame) {
        let area = frame.area();

        let lines = [
            "Tab        switch section",
            "↑/↓        move selection",
            "Enter      open playlist / play song",
            "Space      play / pause",
            "←/→        seek 5s",
            "+/-        volume",
            "n          new playlist",
            "a          add song to the open playlist",
            "d          delete selected",
            "r          refresh catalog",
            "Esc        dismiss error",
            "q          quit",
        ];

        let popup_width = 42;
        let popup_height = lines.len() as u16 + 2;

        let popup_x = area.width.saturating_sub(popup_width) / 2;
        let popup_y = area.height.saturating_sub(popup_height) / 2;

        let popup_area = Rect {
            x: popup_x,
            y: popup_y,
            width: popup_width,
            height: popup_height,
        };

        frame.render_widget(Clear, popup_area);

        let help = Paragraph::new(lines.join("\n"))
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan))
                    .title(" Keybindings (? to close) ")
                    .padding(Padding::horizontal(1))
                    .style(Style::default().bg(Color::Black)),
            );

        frame.render_widget(help, popup_area);
    }

    fn render_input_prompt(frame: &mut Frame, mode: InputMode, buffer: &str) {
        let area = frame.area();

        let popup_width = area.width.saturating_sub(10).clamp(30, 70);
        let popup_height = 3;

        let popup_x = area.width.saturating_sub(popup_width) / 2;
        let popup_y = area.height.saturating_sub(popup_height) / 2;

        let popup_area = Rect {
            x: popup_x,
            y: popup_y,
            width: popup_width,
            height: popup_height,
        };

        frame.render_widget(Clear, popup_area);

        // Keep the tail visible once the text outgrows the popup.
        let visible = popup_width.saturating_sub(5) as usize;
        let chars = buffer.chars().count();
        let shown: String = if chars > visible {
            buffer.chars().skip(chars - visible).collect()
        } else {
            buffer.to_string()
        };

        let prompt = Paragraph::new(format!("{}▏", shown))
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(format!(" {} (Enter to save, Esc to cancel) ", mode.prompt()))
                    .padding(Padding::horizontal(1))
                    .style(Style::default().bg(Color::Black)),
            );

        frame.render_widget(prompt, popup_area);
    }
}
