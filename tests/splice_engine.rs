//! End-to-end splice of a full-length show.
//!
//! A 40 minute recording with 6 s of dead air in front and 10 s behind,
//! spliced between an 8 s intro and a 9 s outro with the stock crossfades.

use show_splicer::audio_buffer::{AudioBuffer, AudioFormat};
use show_splicer::splice::{SpliceConfig, SpliceOutcome, splice};

const SHOW_MS: u64 = 40 * 60 * 1000;
const LEAD_IN_MS: u64 = 6_000;
const TAIL_MS: u64 = 10_000;
const START_JINGLE_MS: u64 = 8_000;
const END_JINGLE_MS: u64 = 9_000;

const INTRO_LEVEL: f32 = 0.4;
const SHOW_LEVEL: f32 = 0.3;
const OUTRO_LEVEL: f32 = 0.2;

fn constant(format: AudioFormat, ms: u64, level: f32) -> AudioBuffer {
    let samples = format.ms_to_frames(ms) * format.channels as usize;
    AudioBuffer::from_interleaved(vec![level; samples], format)
}

fn recording(format: AudioFormat) -> AudioBuffer {
    let program_ms = SHOW_MS - LEAD_IN_MS - TAIL_MS;
    AudioBuffer::join(
        format,
        [
            &AudioBuffer::silent(format, LEAD_IN_MS),
            &constant(format, program_ms, SHOW_LEVEL),
            &AudioBuffer::silent(format, TAIL_MS),
        ],
    )
    .unwrap()
}

fn blend(from: f32, to: f32, i: usize, n: usize) -> f32 {
    (from * (1.0 - i as f32 / n as f32) + to * (i as f32 / n as f32)).clamp(-1.0, 1.0)
}

fn first_sample(buf: &AudioBuffer, frame: usize) -> f32 {
    buf.samples()[frame * buf.channels() as usize]
}

fn check_scenario(format: AudioFormat) {
    let show = recording(format);
    let intro = constant(format, START_JINGLE_MS, INTRO_LEVEL);
    let outro = constant(format, END_JINGLE_MS, OUTRO_LEVEL);
    let config = SpliceConfig::default();

    let finished = match splice(&show, &intro, &outro, &config).unwrap() {
        SpliceOutcome::Finished(f) => f,
        other => panic!("expected a finished show, got {:?}", other),
    };
    let out = &finished.audio;

    assert_eq!(finished.trimmed_ms, SHOW_MS - LEAD_IN_MS - TAIL_MS);
    assert_eq!(finished.removed_ms, LEAD_IN_MS + TAIL_MS);
    assert_eq!(out.duration_ms(), 2_388_000);
    assert_eq!(out.format(), format);

    let trimmed = format.ms_to_frames(finished.trimmed_ms);
    let xs = format.ms_to_frames(config.start_crossfade_ms);
    let xe = format.ms_to_frames(config.end_crossfade_ms);
    let intro_frames = intro.frame_count();
    let outro_frames = outro.frame_count();
    assert_eq!(
        out.frame_count(),
        intro_frames + trimmed + outro_frames - xs - xe
    );

    // untouched intro head
    let blend_start = intro_frames - xs;
    assert_eq!(blend_start, format.ms_to_frames(2_200));
    assert_eq!(first_sample(out, 0), INTRO_LEVEL);
    assert_eq!(first_sample(out, blend_start - 1), INTRO_LEVEL);

    // intro fades out while the show fades in
    for i in [0, 1, xs / 4, xs / 2, xs - 1] {
        let got = first_sample(out, blend_start + i);
        let want = blend(INTRO_LEVEL, SHOW_LEVEL, i, xs);
        assert!((got - want).abs() < 1e-6, "start blend frame {}: {} vs {}", i, got, want);
    }

    // show body at full level
    let body_start = intro_frames;
    let body_end = intro_frames + trimmed - xs - xe;
    assert_eq!(first_sample(out, body_start), SHOW_LEVEL);
    assert_eq!(first_sample(out, body_end - 1), SHOW_LEVEL);

    // show fades out while the outro fades in
    for i in [0, xe / 3, xe - 1] {
        let got = first_sample(out, body_end + i);
        let want = blend(SHOW_LEVEL, OUTRO_LEVEL, i, xe);
        assert!((got - want).abs() < 1e-6, "end blend frame {}: {} vs {}", i, got, want);
    }

    // outro tail
    assert_eq!(first_sample(out, body_end + xe), OUTRO_LEVEL);
    assert_eq!(first_sample(out, out.frame_count() - 1), OUTRO_LEVEL);
}

#[test]
fn forty_minute_show_low_rate() {
    check_scenario(AudioFormat::new(8_000, 1));
}

#[test]
#[ignore = "allocates several GB"]
fn forty_minute_show_cd_quality() {
    check_scenario(AudioFormat::new(44_100, 2));
}

#[test]
fn short_recording_is_skipped_whatever_its_content() {
    let format = AudioFormat::new(8_000, 1);
    let show = constant(format, 60_000, SHOW_LEVEL);
    let intro = constant(format, START_JINGLE_MS, INTRO_LEVEL);
    let outro = constant(format, END_JINGLE_MS, OUTRO_LEVEL);

    let outcome = splice(&show, &intro, &outro, &SpliceConfig::default()).unwrap();
    assert_eq!(outcome, SpliceOutcome::Skipped { length_ms: 60_000 });

    // the first deployment accepted anything over 13 s
    let outcome = splice(&show, &intro, &outro, &SpliceConfig::earliest_revision()).unwrap();
    match outcome {
        SpliceOutcome::Finished(f) => assert_eq!(f.audio.duration_ms(), 60_000 + 8_000 + 9_000 - 13_000),
        other => panic!("expected a finished show, got {:?}", other),
    }
}
