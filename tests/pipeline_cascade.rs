//! Cascade behaviour with scripted backends
//!
//! The backends here record every call, so the tests can check which stages
//! ran, in what order, and what image each one was handed.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use qrde::{
    BackendError, DecodeAttempt, DecodeError, Fallback, Image, Pipeline, QrBackend, StageSource,
    Transform,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Script = fn(&Image) -> Result<Vec<String>, BackendError>;

/// Runs `script` and records the call count plus each input's channel count.
struct Recording {
    name: &'static str,
    script: Script,
    calls: AtomicUsize,
    channels: Mutex<Vec<u8>>,
}

impl Recording {
    fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            calls: AtomicUsize::new(0),
            channels: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn channels(&self) -> Vec<u8> {
        self.channels.lock().unwrap().clone()
    }
}

impl QrBackend for Recording {
    fn name(&self) -> &str {
        self.name
    }

    fn detect_and_decode(&self, image: &Image) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().push(image.channels());
        (self.script)(image)
    }
}

fn nothing(_: &Image) -> Result<Vec<String>, BackendError> {
    Ok(Vec::new())
}

fn hello(_: &Image) -> Result<Vec<String>, BackendError> {
    Ok(vec!["hello".to_string()])
}

/// Succeeds only on a 0/255 single-channel image, like a detector that can
/// only read a code once it has been binarized.
fn two_level_only(image: &Image) -> Result<Vec<String>, BackendError> {
    let binary = image.is_gray() && image.as_bytes().iter().all(|&v| v == 0 || v == 255);
    Ok(if binary { vec!["hello".to_string()] } else { Vec::new() })
}

fn broken(_: &Image) -> Result<Vec<String>, BackendError> {
    Err(BackendError::Engine {
        backend: "broken".to_string(),
        message: "assertion failed: !img.empty()".to_string(),
    })
}

fn exploding(_: &Image) -> Result<Vec<String>, BackendError> {
    panic!("engine crashed")
}

/// Low-contrast color checkerboard.
fn faint_rgb() -> Image {
    Image::from_rgb(RgbImage::from_fn(48, 48, |x, y| {
        if (x / 6 + y / 6) % 2 == 0 {
            Rgb([118, 121, 119])
        } else {
            Rgb([131, 133, 130])
        }
    }))
}

fn default_shape(primary: Arc<Recording>, secondary: Arc<Recording>) -> Pipeline {
    Pipeline::builder()
        .stage(DecodeAttempt::new("direct", primary.clone()).transform(Transform::Identity))
        .stage(DecodeAttempt::new("binarize", primary.clone()).transforms([
            Transform::Grayscale,
            Transform::Median { ksize: 5 },
            Transform::Otsu,
        ]))
        .stage(DecodeAttempt::new("morph-close", primary).transform(Transform::MorphClose { ksize: 5 }))
        .fallback(Fallback::new(secondary))
        .build()
        .unwrap()
}

#[test]
fn first_stage_hit_skips_the_rest() {
    let primary = Recording::new("primary", hello);
    let secondary = Recording::new("secondary", hello);
    let pipeline = default_shape(primary.clone(), secondary.clone());

    let result = pipeline.run(&faint_rgb());
    assert_eq!(result.texts, vec!["hello"]);
    assert_eq!(result.stage(), Some("direct"));
    assert_eq!(result.attempts, 1);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[test]
fn binarize_stage_reports_its_name() {
    let primary = Recording::new("primary", two_level_only);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = default_shape(primary.clone(), secondary.clone());

    let result = pipeline.run(&faint_rgb());
    assert_eq!(result.texts, vec!["hello"]);
    assert_eq!(result.stage(), Some("binarize"));
    assert_eq!(result.attempts, 2);
    assert_eq!(primary.channels(), vec![3, 1]);
    assert_eq!(secondary.calls(), 0);
}

#[test]
fn exhausted_cascade_calls_every_stage_once() {
    let primary = Recording::new("primary", nothing);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = default_shape(primary.clone(), secondary.clone());

    let result = pipeline.run(&faint_rgb());
    assert!(!result.found());
    assert_eq!(result.stage(), None);
    assert_eq!(result.attempts, 4);
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
}

#[test]
fn fallback_sees_last_stage_output() {
    let primary = Recording::new("primary", nothing);
    let secondary = Recording::new("secondary", nothing);
    // morph-close runs on the color original, so the fallback gets color.
    default_shape(primary.clone(), secondary.clone()).run(&faint_rgb());
    assert_eq!(primary.channels(), vec![3, 1, 3]);
    assert_eq!(secondary.channels(), vec![3]);

    let primary = Recording::new("primary", nothing);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = Pipeline::builder()
        .stage(DecodeAttempt::new("direct", primary.clone()))
        .stage(DecodeAttempt::new("otsu", primary).transform(Transform::Otsu))
        .fallback(Fallback::new(secondary.clone()))
        .build()
        .unwrap();
    pipeline.run(&faint_rgb());
    assert_eq!(secondary.channels(), vec![1]);
}

#[test]
fn previous_source_chains_stage_outputs() {
    let backend = Recording::new("primary", nothing);
    let pipeline = Pipeline::builder()
        .stage(DecodeAttempt::new("gray", backend.clone()).transform(Transform::Grayscale))
        .stage(
            DecodeAttempt::new("again", backend.clone())
                .source(StageSource::Previous)
                .transform(Transform::Identity),
        )
        .stage(DecodeAttempt::new("fresh", backend.clone()))
        .build()
        .unwrap();

    pipeline.run(&faint_rgb());
    assert_eq!(backend.channels(), vec![1, 1, 3]);
}

#[test]
fn stage_errors_and_panics_do_not_stop_the_cascade() {
    let failing = Recording::new("failing", broken);
    let panicking = Recording::new("panicking", exploding);
    let working = Recording::new("working", hello);
    let pipeline = Pipeline::builder()
        .stage(DecodeAttempt::new("direct", failing.clone()))
        .stage(DecodeAttempt::new("binarize", panicking.clone()).transform(Transform::Otsu))
        .stage(DecodeAttempt::new("morph-close", working.clone()))
        .build()
        .unwrap();

    let result = pipeline.run(&faint_rgb());
    assert_eq!(result.stage(), Some("morph-close"));
    assert_eq!(result.texts, vec!["hello"]);
    assert_eq!(failing.calls(), 1);
    assert_eq!(panicking.calls(), 1);

    // A panic must not leave the pipeline unusable.
    assert_eq!(pipeline.run(&faint_rgb()).stage(), Some("morph-close"));
}

#[test]
fn rejected_input_runs_no_stage() {
    let primary = Recording::new("primary", hello);
    let secondary = Recording::new("secondary", hello);
    let pipeline = default_shape(primary.clone(), secondary.clone());

    for bytes in [&b""[..], &b"GIF89a but not really"[..]] {
        assert!(matches!(
            pipeline.run_bytes(bytes),
            Err(DecodeError::InputRejected { .. })
        ));
    }
    assert_eq!(primary.calls(), 0);
    assert_eq!(secondary.calls(), 0);
}

#[test]
fn repeated_runs_are_identical() {
    let primary = Recording::new("primary", two_level_only);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = default_shape(primary, secondary);
    let image = faint_rgb();

    let first = pipeline.run(&image);
    let second = pipeline.run(&image);
    assert_eq!(first, second);
}

#[test]
fn input_image_is_left_untouched() {
    let primary = Recording::new("primary", nothing);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = default_shape(primary, secondary);
    let image = faint_rgb();
    let before = image.as_bytes().to_vec();

    pipeline.run(&image);
    assert_eq!(image.as_bytes(), before.as_slice());
}

#[test]
fn encoded_upload_goes_through_the_cascade() {
    let primary = Recording::new("primary", two_level_only);
    let secondary = Recording::new("secondary", nothing);
    let pipeline = default_shape(primary, secondary);

    let mut png = Cursor::new(Vec::new());
    let rgb = RgbImage::from_fn(32, 32, |x, _| if x < 16 { Rgb([90, 90, 90]) } else { Rgb([160, 160, 160]) });
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut png, ImageFormat::Png)
        .unwrap();

    let result = pipeline.run_bytes(png.get_ref()).unwrap();
    assert_eq!(result.stage(), Some("binarize"));
}
