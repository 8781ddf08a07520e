use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tiled_watermark::{
    Error, Options, OutputPolicy, OverlayMode, SettingsProvider, WatermarkSettings, Watermarker,
};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MARK: Rgba<u8> = Rgba([200, 10, 10, 255]);

fn write_png(dir: &Path, name: &str, img: &RgbaImage) -> String {
    let path = dir.join(name);
    img.save_with_format(&path, ImageFormat::Png).unwrap();
    path.display().to_string()
}

fn engine_with_mark(root: &Path, mark: &str, output: OutputPolicy) -> Watermarker {
    let settings = WatermarkSettings {
        watermark: Some(mark.to_string()),
        image: None,
        alpha_level: 50,
    };
    let options = Options {
        document_root: root.to_path_buf(),
        output,
        ..Options::default()
    };
    Watermarker::new(options, &settings).unwrap()
}

#[test]
fn small_watermark_is_tiled_over_the_whole_image() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(10, 7, BLACK));
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(4, 3, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    let out = engine.draw(&image);

    assert_ne!(out, image);
    assert!(engine.error_logs().is_empty());
    let result = image::open(&out).unwrap().to_rgba8();
    assert_eq!(result.dimensions(), (10, 7));
    assert!(result.pixels().all(|p| *p == MARK));
}

#[test]
fn transparent_areas_of_the_watermark_keep_the_image() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(6, 6, BLACK));
    let mut mark_img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 0]));
    mark_img.put_pixel(1, 1, MARK);
    let mark = write_png(root.path(), "mark.png", &mark_img);

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    let result = image::open(engine.draw(&image)).unwrap().to_rgba8();

    for (x, y, px) in result.enumerate_pixels() {
        let expected = if x % 3 == 1 && y % 3 == 1 { MARK } else { BLACK };
        assert_eq!(*px, expected, "pixel ({x}, {y})");
    }
}

#[test]
fn jpeg_and_webp_inputs_are_decoded_and_written_as_png() {
    let root = tempfile::tempdir().unwrap();
    let jpeg = root.path().join("photo.jpg");
    RgbImage::from_pixel(8, 8, Rgb([20, 20, 20]))
        .save_with_format(&jpeg, ImageFormat::Jpeg)
        .unwrap();
    let webp = root.path().join("photo.webp");
    RgbaImage::from_pixel(8, 8, BLACK)
        .save_with_format(&webp, ImageFormat::WebP)
        .unwrap();
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(8, 8, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    for input in [&jpeg, &webp] {
        let out = engine.draw(&input.display().to_string());
        let out = PathBuf::from(out);
        assert_eq!(image::ImageFormat::from_path(&out).unwrap(), ImageFormat::Png);
        let result = image::open(&out).unwrap().to_rgba8();
        assert_eq!(*result.get_pixel(4, 4), MARK);
    }
    assert!(engine.error_logs().is_empty());
}

#[test]
fn empty_watermark_is_a_passthrough() {
    let root = tempfile::tempdir().unwrap();
    let options = Options {
        document_root: root.path().to_path_buf(),
        output: OutputPolicy::Replace,
        ..Options::default()
    };
    let mut engine = Watermarker::new(options, &WatermarkSettings::default()).unwrap();

    assert_eq!(engine.draw("/does/not/exist.png"), "/does/not/exist.png");
    assert!(engine.error_logs().is_empty());
    assert!(!root.path().join("upload").exists());
}

#[test]
fn corrupt_image_returns_input_and_logs_decode_failure() {
    let root = tempfile::tempdir().unwrap();
    let broken = root.path().join("broken.png");
    std::fs::write(&broken, b"not a png at all").unwrap();
    let broken = broken.display().to_string();
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    assert_eq!(engine.draw(&broken), broken);
    assert!(matches!(
        engine.error_log(&broken),
        Some(Error::DecodeFailure { .. })
    ));

    let outputs: Vec<_> = std::fs::read_dir(engine.temp_dir()).unwrap().collect();
    assert!(outputs.is_empty());
}

#[test]
fn broken_watermark_returns_input_unchanged() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(4, 4, BLACK));
    let mark = root.path().join("mark.png");
    std::fs::write(&mark, b"garbage").unwrap();

    let mut engine = engine_with_mark(
        root.path(),
        &mark.display().to_string(),
        OutputPolicy::Replace,
    );
    assert_eq!(engine.draw(&image), image);
    assert!(engine.error_log(&image).is_some());

    let untouched = image::open(&image).unwrap().to_rgba8();
    assert!(untouched.pixels().all(|p| *p == BLACK));
}

#[test]
fn unsupported_encoding_is_logged() {
    let root = tempfile::tempdir().unwrap();
    let gif = root.path().join("anim.gif");
    std::fs::write(&gif, b"GIF89a").unwrap();
    let gif = gif.display().to_string();
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    assert_eq!(engine.draw(&gif), gif);
    assert!(matches!(
        engine.error_log(&gif),
        Some(Error::UnsupportedEncoding(_))
    ));
}

#[test]
fn directory_input_is_unresolvable() {
    let root = tempfile::tempdir().unwrap();
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));
    let dir = root.path().display().to_string();

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    assert_eq!(engine.draw(&dir), dir);
    assert!(matches!(
        engine.error_log(&dir),
        Some(Error::UnresolvableSource(_))
    ));
}

#[test]
fn new_file_policy_produces_distinct_outputs_per_call() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(4, 4, BLACK));
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    let first = engine.draw(&image);
    let second = engine.draw(&image);

    assert_ne!(first, second);
    assert!(Path::new(&first).is_file());
    assert!(Path::new(&second).is_file());

    drop(engine);
    assert!(!Path::new(&first).exists());
    assert!(!Path::new(&second).exists());
    assert!(Path::new(&image).is_file());
}

#[test]
fn replace_policy_overwrites_the_source() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(4, 4, BLACK));
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::Replace);
    assert_eq!(engine.draw(&image), image);
    assert_eq!(engine.draw(&image), image);
    drop(engine);

    let result = image::open(&image).unwrap().to_rgba8();
    assert!(result.pixels().all(|p| *p == MARK));
}

#[test]
fn relative_references_resolve_against_document_root() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("upload/iblock")).unwrap();
    write_png(
        &root.path().join("upload/iblock"),
        "photo.png",
        &RgbaImage::from_pixel(4, 4, BLACK),
    );
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(4, 4, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    let out = engine.draw("/upload/iblock/photo.png");

    assert!(engine.error_logs().is_empty(), "{:?}", engine.error_logs());
    assert!(Path::new(&out).starts_with(engine.temp_dir()));
}

#[test]
fn batch_drawing_keeps_input_order() {
    let root = tempfile::tempdir().unwrap();
    let a = write_png(root.path(), "a.png", &RgbaImage::from_pixel(5, 5, BLACK));
    let b = root.path().join("b.bmp").display().to_string();
    let c = write_png(root.path(), "c.png", &RgbaImage::from_pixel(3, 9, BLACK));
    let mark = write_png(root.path(), "mark.png", &RgbaImage::from_pixel(2, 2, MARK));

    let mut engine = engine_with_mark(root.path(), &mark, OutputPolicy::NewFile);
    let outputs = engine.draw_all(&[a.clone(), b.clone(), c.clone()]);

    assert_eq!(outputs.len(), 3);
    assert!(outputs[0].ends_with("a.png") && outputs[0] != a);
    assert_eq!(outputs[1], b);
    assert!(outputs[2].ends_with("c.png") && outputs[2] != c);
    assert_eq!(engine.error_logs().len(), 1);
    assert!(engine.error_log(&b).is_some());
}

#[test]
fn over_mode_blends_instead_of_replacing() {
    let root = tempfile::tempdir().unwrap();
    let image = write_png(root.path(), "photo.png", &RgbaImage::from_pixel(4, 4, BLACK));
    let mark = write_png(
        root.path(),
        "mark.png",
        &RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 128])),
    );
    let settings = WatermarkSettings {
        watermark: Some(mark),
        ..WatermarkSettings::default()
    };
    let options = Options {
        document_root: root.path().to_path_buf(),
        overlay: OverlayMode::Over,
        ..Options::default()
    };

    let mut engine = Watermarker::new(options, &settings).unwrap();
    let result = image::open(engine.draw(&image)).unwrap().to_rgba8();
    let px = result.get_pixel(0, 0);
    assert_eq!(px[3], 255);
    assert!(px[0] > 100 && px[0] < 160);
}

#[derive(Default)]
struct RecordingSettings {
    raw: String,
    stored: Mutex<Vec<PathBuf>>,
}

impl SettingsProvider for RecordingSettings {
    fn watermark_settings(&self) -> WatermarkSettings {
        WatermarkSettings {
            watermark: None,
            image: Some(self.raw.clone()),
            alpha_level: -5,
        }
    }

    fn store_prepared(&self, path: &Path) {
        self.stored.lock().unwrap().push(path.to_path_buf());
    }
}

#[test]
fn generated_watermark_is_handed_back_to_the_provider() {
    let root = tempfile::tempdir().unwrap();
    let raw = write_png(root.path(), "logo.png", &RgbaImage::from_pixel(2, 2, MARK));
    let settings = RecordingSettings {
        raw,
        ..RecordingSettings::default()
    };
    let options = Options {
        document_root: root.path().to_path_buf(),
        ..Options::default()
    };

    let engine = Watermarker::new(options, &settings).unwrap();
    assert_eq!(engine.opacity().get(), 1);

    let stored = settings.stored.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(Some(stored[0].as_path()), engine.watermark_path());

    // Opacity 1: transparency 0 + 127 / 101 * 1 = 1.26, stored as 1.
    let prepared = image::open(&stored[0]).unwrap().to_rgba8();
    assert_eq!(*prepared.get_pixel(0, 0), Rgba([200, 10, 10, 253]));
}

#[test]
fn failed_generation_falls_back_to_raw_image() {
    let root = tempfile::tempdir().unwrap();
    let raw = root.path().join("logo.png");
    std::fs::write(&raw, b"nope").unwrap();
    let settings = RecordingSettings {
        raw: raw.display().to_string(),
        ..RecordingSettings::default()
    };
    let options = Options {
        document_root: root.path().to_path_buf(),
        ..Options::default()
    };

    let engine = Watermarker::new(options, &settings).unwrap();
    assert!(settings.stored.lock().unwrap().is_empty());
    assert_eq!(engine.watermark_path(), Some(raw.as_path()));
    assert!(engine.error_log(&raw.display().to_string()).is_some());
}
