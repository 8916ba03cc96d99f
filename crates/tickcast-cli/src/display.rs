//! Console rendering of tick output.

use tickcast_core::{Event, EventKind, Snapshot, TickOutput};

/// Print one tick's worth of output: lifecycle banners plus event lines.
pub fn print_tick(output: &TickOutput) {
    if output.game_started {
        println!("{}", game_banner(&output.snapshot));
    }
    for event in &output.events {
        println!("{}", format_event(event));
    }
    if output.game_ended {
        println!("{}", final_scores(&output.snapshot));
    }
}

fn game_banner(snapshot: &Snapshot) -> String {
    format!(
        "=== Game started: {} on {} ({}) ===",
        snapshot.game_type,
        snapshot.map_name,
        if snapshot.team_game {
            "teams"
        } else {
            "free-for-all"
        }
    )
}

fn final_scores(snapshot: &Snapshot) -> String {
    let mut line = format!("=== Game over on {} ===", snapshot.map_name);
    if !snapshot.team_scores.is_empty() {
        line.push_str(&format!(" teams {:?}", snapshot.team_scores));
    }
    for player in &snapshot.players {
        line.push_str(&format!("\n  {} : {}", player.name, player.score));
    }
    line
}

fn format_event(event: &Event) -> String {
    let detail = match &event.kind {
        EventKind::GameStarted { map } => format!("game started on {}", map),
        EventKind::GameEnded { map } => format!("game ended on {}", map),
        EventKind::Kill { name, total, .. } => format!("{} scored a kill (total {})", name, total),
        EventKind::Death { name, total, .. } => format!("{} died (total {})", name, total),
        EventKind::Assist { name, total, .. } => {
            format!("{} got an assist (total {})", name, total)
        }
        EventKind::Damage {
            dealer,
            receiver,
            amount,
        } => format!("player {} hit player {} for {:.1}", dealer, receiver, amount),
        EventKind::GrenadeThrown { name, kind, .. } => {
            format!("{} threw a {} grenade", name, kind)
        }
        EventKind::CamoAcquired { name, .. } => format!("{} picked up camo", name),
        EventKind::CamoLost { name, .. } => format!("{} lost camo", name),
        EventKind::OvershieldAcquired { name, .. } => format!("{} picked up overshield", name),
        EventKind::OvershieldLost { name, .. } => format!("{} lost overshield", name),
        EventKind::PlayerSpawned {
            name,
            spawn,
            position,
            ..
        } => match spawn {
            Some(index) => format!("{} spawned at point {}", name, index),
            None => format!(
                "{} spawned off-grid at ({:.1}, {:.1}, {:.1})",
                name, position.x, position.y, position.z
            ),
        },
    };
    format!("[{:>7}] {}", event.tick, detail)
}
