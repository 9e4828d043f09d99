use crate::api::response::CurrentlyPlaying;

fn clock(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Render one playback snapshot to stdout.
pub fn render(playing: &CurrentlyPlaying) {
    let Some(track) = playing.track() else {
        return;
    };

    let progress = playing.progress_ms.unwrap_or(0);
    println!(
        "♪ {} - {} [{}/{}]",
        track.name,
        playing.artist_names().join(", "),
        clock(progress),
        clock(track.duration_ms),
    );
    if let Some(artwork) = playing.artwork_url() {
        println!("  artwork: {artwork}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_formats_minutes_and_padded_seconds() {
        assert_eq!(clock(0), "0:00");
        assert_eq!(clock(59_999), "0:59");
        assert_eq!(clock(200_000), "3:20");
        assert_eq!(clock(3_600_000), "60:00");
    }
}
