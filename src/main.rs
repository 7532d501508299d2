//! Space Rescue entry point
//!
//! The real host owns a window, a key poller, and an audio transport; this
//! binary wires the same seams to a headless demo loop so the whole engine
//! can be exercised (and profiled) without any of them.

use space_rescue::assets::{AssetLibrary, SpriteTable};
use space_rescue::audio::Jukebox;
use space_rescue::consts::SIM_DT;
use space_rescue::highscores::HighScore;
use space_rescue::settings::Tuning;
use space_rescue::sim::{tick, Event, GameState, TickInput};

const HIGH_SCORE_PATH: &str = "highscore.json";
const TUNING_PATH: &str = "tuning.json";
const ASSET_DIR: &str = "assets/images";

fn main() {
    env_logger::init();
    log::info!("Space Rescue starting");

    let tuning = Tuning::load(TUNING_PATH);
    let mut high_score = HighScore::load(HIGH_SCORE_PATH);

    // a missing asset directory is survivable for the headless demo; the
    // engine falls back to primitive draws. A real host should treat this
    // as fatal.
    let sprites = match AssetLibrary::load_dir(ASSET_DIR) {
        Ok(lib) => SpriteTable::from_library(&lib),
        Err(e) => {
            log::warn!("{e}; running with primitive sprites");
            SpriteTable::default()
        }
    };

    let mut jukebox = Jukebox::new();
    jukebox.add_track("Orbital Decay", 0, 1.0);
    jukebox.add_track("Corridor Run", 12, 0.9);
    jukebox.add_track("Last Hostage", 0, 1.0);

    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(2017);
    let mut state = GameState::with_config(seed, tuning, sprites);
    log::info!("seed {seed}");

    if let Some(track) = jukebox.advance() {
        state.set_song_name(track.name.clone());
    }

    // 60 seconds of scripted flight: thrust pulses, a rotation stretch,
    // steady fire, one smart bomb
    let total_ticks = (60.0 / SIM_DT) as u64;
    for t in 0..total_ticks {
        let secs = t as f32 * SIM_DT;
        let input = TickInput {
            thrust: (secs % 2.0) < 0.6,
            rotate_right: (8.0..11.0).contains(&secs),
            fire: secs > 5.0,
            smart_bomb: (20.0..20.2).contains(&secs),
            next_track: (30.0..30.1).contains(&secs),
            ..Default::default()
        };

        tick(&mut state, &input, SIM_DT);

        for event in state.events.clone() {
            match event {
                Event::NextTrackRequested => {
                    if let Some(track) = jukebox.advance() {
                        state.set_song_name(track.name.clone());
                    }
                }
                Event::BestRescueScore(score) => {
                    if high_score.submit(score) {
                        if let Err(e) = high_score.save(HIGH_SCORE_PATH) {
                            log::warn!("could not save high score: {e}");
                        }
                    }
                }
                Event::LevelUp(level) => log::info!("level {level}"),
                Event::ShipExploded => log::debug!("ship destroyed"),
                Event::HostageRescued(kind) => log::info!("rescued {kind:?}"),
            }
        }

        if t % 300 == 299 {
            let frame = state.draw();
            log::info!(
                "t={:>4.1}s level={} kills={} deaths={} score={} objects={} draw_cmds={}",
                secs,
                state.level,
                state.kills,
                state.deaths,
                state.score,
                state.active_objects(),
                frame.cmds.len(),
            );
        }
    }

    println!(
        "demo complete: level {} / {} kills / {} deaths / score {} / best {}",
        state.level, state.kills, state.deaths, state.score, high_score.best
    );
}
