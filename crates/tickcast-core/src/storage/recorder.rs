use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::events::Event;
use crate::game::{GameType, Snapshot};
use crate::sink::TickOutput;

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record<'a> {
    GameStart {
        time: DateTime<Utc>,
        map: &'a str,
        game_type: GameType,
        players: Vec<&'a str>,
    },
    Event {
        #[serde(flatten)]
        event: &'a Event,
    },
    GameEnd {
        time: DateTime<Utc>,
        tick: u32,
        team_scores: &'a [i32],
        scores: Vec<(&'a str, i32)>,
    },
}

struct GameLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

/// Writes one JSON-lines file per game: a start record, every event, and a
/// final score record.
pub struct GameRecorder {
    dir: PathBuf,
    current: Option<GameLog>,
}

impl GameRecorder {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            current: None,
        })
    }

    /// Append one tick's worth of records, opening and closing game files on
    /// the lifecycle events.
    pub fn record(&mut self, output: &TickOutput) -> Result<()> {
        if output.game_started {
            self.begin_game(&output.snapshot)?;
        }

        if let Some(log) = self.current.as_mut() {
            for event in &output.events {
                let line = serde_json::to_string(&Record::Event { event })?;
                writeln!(log.writer, "{}", line)?;
            }
        }

        if output.game_ended {
            self.end_game(&output.snapshot)?;
        }
        Ok(())
    }

    fn begin_game(&mut self, snapshot: &Snapshot) -> Result<()> {
        // A start without a preceding end finalizes the old file first.
        if self.current.is_some() {
            self.end_game(snapshot)?;
        }

        let map = if snapshot.map_name.is_empty() {
            "unknown"
        } else {
            snapshot.map_name.as_str()
        };
        let stamp = snapshot.captured_at.format("%Y%m%d-%H%M%S");
        let path = self.dir.join(format!("game-{}-{}.jsonl", stamp, map));
        let mut writer = BufWriter::new(File::create(&path)?);

        let start = Record::GameStart {
            time: snapshot.captured_at,
            map: &snapshot.map_name,
            game_type: snapshot.game_type,
            players: snapshot.players.iter().map(|p| p.name.as_str()).collect(),
        };
        writeln!(writer, "{}", serde_json::to_string(&start)?)?;
        info!("Recording game to {}", path.display());
        self.current = Some(GameLog { writer, path });
        Ok(())
    }

    fn end_game(&mut self, snapshot: &Snapshot) -> Result<()> {
        let Some(mut log) = self.current.take() else {
            return Ok(());
        };
        let end = Record::GameEnd {
            time: snapshot.captured_at,
            tick: snapshot.tick,
            team_scores: &snapshot.team_scores,
            scores: snapshot
                .players
                .iter()
                .map(|p| (p.name.as_str(), p.score))
                .collect(),
        };
        writeln!(log.writer, "{}", serde_json::to_string(&end)?)?;
        log.writer.flush()?;
        info!("Finished recording {}", log.path.display());
        Ok(())
    }

    /// Flush and close any open game file (shutdown path).
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut log) = self.current.take() {
            log.writer.flush()?;
        }
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.current.is_some()
    }
}

impl Drop for GameRecorder {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::game::TickStats;

    fn output(tick: u32, started: bool, ended: bool, events: Vec<Event>) -> TickOutput {
        let mut snapshot = Snapshot::empty();
        snapshot.tick = tick;
        snapshot.map_name = "chillout".to_string();
        TickOutput {
            snapshot,
            events,
            stats: TickStats::default(),
            game_started: started,
            game_ended: ended,
        }
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_records_full_game() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = GameRecorder::new(dir.path()).unwrap();

        recorder.record(&output(10, true, false, Vec::new())).unwrap();
        assert!(recorder.is_recording());
        recorder
            .record(&output(
                11,
                false,
                false,
                vec![Event::new(
                    11,
                    EventKind::Kill {
                        player: 0,
                        name: "Sarge".to_string(),
                        total: 1,
                    },
                )],
            ))
            .unwrap();
        recorder.record(&output(12, false, true, Vec::new())).unwrap();
        assert!(!recorder.is_recording());

        let files = log_files(dir.path());
        assert_eq!(files.len(), 1);
        let contents = fs::read_to_string(&files[0]).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let start: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(start["record"], "game_start");
        assert_eq!(start["map"], "chillout");

        let event: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(event["event"], "kill");
        assert_eq!(event["tick"], 11);

        let end: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(end["record"], "game_end");
        assert_eq!(end["tick"], 12);
    }

    #[test]
    fn test_no_file_outside_games() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = GameRecorder::new(dir.path()).unwrap();
        recorder
            .record(&output(
                5,
                false,
                false,
                vec![Event::new(
                    5,
                    EventKind::GrenadeThrown {
                        player: 0,
                        name: "Grif".to_string(),
                        kind: crate::game::GrenadeKind::Frag,
                    },
                )],
            ))
            .unwrap();
        assert!(log_files(dir.path()).is_empty());
    }

    #[test]
    fn test_back_to_back_games_get_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = GameRecorder::new(dir.path()).unwrap();
        let mut first = output(10, true, false, Vec::new());
        first.snapshot.map_name = "damnation".to_string();
        recorder.record(&first).unwrap();
        // New start without an intervening end.
        let mut second = output(20, true, false, Vec::new());
        second.snapshot.captured_at = first.snapshot.captured_at + chrono::Duration::seconds(61);
        recorder.record(&second).unwrap();
        recorder.close().unwrap();

        assert_eq!(log_files(dir.path()).len(), 2);
    }
}
