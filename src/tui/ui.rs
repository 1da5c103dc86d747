use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::models::SummaryStatus;

pub fn draw(frame: &mut Frame, app: &App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Status bar
            Constraint::Min(0),    // Panes
        ])
        .split(frame.area());

    // 1/3 left, 2/3 right
    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 3), Constraint::Ratio(2, 3)])
        .split(outer[1]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40), // Rolling summary
            Constraint::Min(0),         // Article list
        ])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Preview
            Constraint::Length(3), // Command input
        ])
        .split(main_chunks[1]);

    render_status_bar(frame, app, outer[0]);
    render_summary(frame, app, left_chunks[0]);
    render_article_list(frame, app, left_chunks[1]);
    render_preview(frame, app, right_chunks[0]);
    render_command_input(frame, app, right_chunks[1]);

    if app.show_help {
        render_help(frame);
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut first = vec![
        Span::styled(
            " RSS Digest",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | {}", app.status)),
    ];
    match app.next_refresh {
        Some(next) if app.auto_refresh => {
            first.push(Span::styled(
                format!(" | Next check at: {}", next.format("%H:%M")),
                Style::default().fg(Color::DarkGray),
            ));
        }
        _ => first.push(Span::styled(
            " | Auto-refresh off",
            Style::default().fg(Color::DarkGray),
        )),
    }

    let hint = Style::default().fg(Color::Yellow);
    let second = Line::from(vec![
        Span::styled(" Ctrl+R", hint),
        Span::raw(": Refresh | "),
        Span::styled("Ctrl+O", hint),
        Span::raw(": Open in browser | "),
        Span::styled(":", hint),
        Span::raw(" Command | "),
        Span::styled("?", hint),
        Span::raw(" Help"),
    ]);

    let paragraph = Paragraph::new(vec![Line::from(first), second]);
    frame.render_widget(paragraph, area);
}

fn render_summary(frame: &mut Frame, app: &App, area: Rect) {
    let (title, content, style) = match app.summary_status {
        SummaryStatus::NotGenerated => (
            " Summary ",
            "No summary yet. One is generated after new articles are fetched.".to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        SummaryStatus::Generating => (
            " Summary (updating...) ",
            app.summary.clone(),
            Style::default().fg(Color::White),
        ),
        SummaryStatus::Failed => (
            " Summary (failed) ",
            app.summary.clone(),
            Style::default().fg(Color::Red),
        ),
        SummaryStatus::Generated => (" Summary ", app.summary.clone(), Style::default().fg(Color::White)),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let paragraph = Paragraph::new(content)
        .block(block)
        .style(style)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn render_article_list(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .articles
        .iter()
        .map(|article| {
            let published = article.published_at.with_timezone(&Local).format("%m/%d %H:%M");
            ListItem::new(vec![
                Line::from(Span::styled(
                    article.title.as_str(),
                    Style::default().fg(Color::White),
                )),
                Line::from(Span::styled(
                    format!("  {published} | {}", article.source),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let title = format!(" News ({}) ", app.articles.len());
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.articles.is_empty() {
        state.select(Some(app.selected_index));
    }

    frame.render_stateful_widget(list, area, &mut state);
}

fn render_preview(frame: &mut Frame, app: &App, area: Rect) {
    let content = if app.preview.is_empty() {
        "Select an article to preview it."
    } else {
        app.preview.as_str()
    };

    let block = Block::default()
        .title(" Preview ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: false });

    frame.render_widget(paragraph, area);
}

fn render_command_input(frame: &mut Frame, app: &App, area: Rect) {
    let (text, border) = if app.command_input_active {
        (format!(":{}_", app.command_input), Color::Yellow)
    } else {
        ("Press : to enter a command".to_string(), Color::DarkGray)
    };

    let block = Block::default()
        .title(" Command ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

    let paragraph = Paragraph::new(text).block(block);
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(50, 60, frame.area());

    let help_text = vec![
        "",
        " Navigation:",
        "   j / ↓        Move down",
        "   k / ↑        Move up",
        "   Home / End   First / last article",
        "",
        " Actions:",
        "   r / Ctrl+R   Refresh feeds",
        "   o / Ctrl+O   Open in browser",
        "   t            Toggle auto-refresh",
        "   :            Enter a command",
        "",
        " Commands:",
        "   add <url>    Subscribe to a feed",
        "   rm <url>     Unsubscribe",
        "   apikey <key> Store the API key",
        "   config       Show key and feeds",
        "",
        " General:",
        "   ?            Toggle this help",
        "   q / Ctrl+C   Quit",
        "",
        " Press any key to close",
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(help_text.join("\n"))
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
