//! Terminal rendering of sources, decisions and notifications

use soundmaster_core::domain::{
    AudioSource, CommandResult, Notification, NotificationKind, PlaybackDecision, RouteDecision,
    VolumeDecision,
};

pub fn print_sources(sources: &[AudioSource]) {
    if sources.is_empty() {
        println!("No active audio sources found");
        return;
    }

    println!(
        "{:<6} {:<22} {:<8} {:>6}  {:<11} {}",
        "ID", "NAME", "STATE", "VOLUME", "OUTPUT", "PRIORITY"
    );
    for source in sources {
        println!(
            "{:<6} {:<22} {:<8} {:>5}%  {:<11} {}",
            source.id,
            truncate(&source.name, 22),
            if source.is_playing { "playing" } else { "paused" },
            (source.volume.level() * 100.0).round() as u32,
            source.output.label(),
            source
                .priority
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}

pub fn print_notification(notification: &Notification) {
    let marker = match notification.kind {
        NotificationKind::Success => "✓",
        NotificationKind::Error => "✗",
        NotificationKind::Warning => "!",
        NotificationKind::Info => "i",
    };
    match &notification.description {
        Some(description) => println!("{} {} ({})", marker, notification.message, description),
        None => println!("{} {}", marker, notification.message),
    }
}

pub fn print_result(result: &CommandResult) {
    match result {
        CommandResult::Route(RouteDecision::UnknownSource)
        | CommandResult::Playback(PlaybackDecision::UnknownSource)
        | CommandResult::Volume(VolumeDecision::UnknownSource) => {
            println!("No such audio source");
        }
        CommandResult::Route(RouteDecision::Expired(id)) => {
            println!("Confirmation {} is no longer pending", id);
        }
        CommandResult::Error(e) => println!("Error: {}", e),
        _ => {}
    }
}

fn truncate(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        name.to_string()
    } else {
        let mut short: String = name.chars().take(width.saturating_sub(1)).collect();
        short.push('…');
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Spotify", 22), "Spotify");
        assert_eq!(truncate("A very long application name", 10), "A very lo…");
    }
}
