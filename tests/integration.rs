use imgref::ImgVec;
use tonematch::filters::cutoff;
use tonematch::raster::PixelExt;
use tonematch::variants::filter_close;
use tonematch::{
    Config, Corpus, Diapason, Error, FilterKind, Histogram, Pixel, Reference, StageContext,
    ToneMatcher,
};

/// Normalized bump centered on bucket `center`.
fn bump(buckets: usize, center: f64, width: f64) -> Vec<f64> {
    let raw: Vec<f64> = (0..buckets)
        .map(|i| {
            let d = (i as f64 - center) / width;
            (-0.5 * d * d).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

fn references(kind: FilterKind, count: usize) -> Vec<Reference> {
    let buckets = kind.bucket_count();
    (0..count)
        .map(|i| {
            let center = buckets as f64 * (0.05 + 0.6 * i as f64 / count.max(1) as f64);
            Reference {
                id: i as u32,
                popularity: 1.0 / (i + 1) as f64,
                average_error: 0.01,
                data: bump(buckets, center, buckets as f64 / 20.0),
            }
        })
        .collect()
}

fn corpus(count: usize) -> Corpus {
    let [details, zonal, saturation, luminance] =
        FilterKind::ALL.map(|kind| references(kind, count));
    Corpus::new(details, zonal, saturation, luminance).unwrap()
}

fn photo(width: usize, height: usize) -> ImgVec<Pixel> {
    let buf = (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f32, (i / width) as f32);
            let base = 30.0 + 150.0 * x / width as f32 + 40.0 * y / height as f32;
            Pixel::new(base, base * 0.85 + 10.0, base * 0.6 + 5.0 * (x * 0.9).sin())
        })
        .collect();
    ImgVec::new(buf, width, height)
}

#[test]
fn flat_image_survives_cutoff() {
    let img = ImgVec::new(vec![Pixel::new(128.0, 128.0, 128.0); 4], 2, 2);
    let out = cutoff::apply(img.as_ref(), 0.0);
    assert_eq!(out.width(), 2);
    assert_eq!(out.height(), 2);
    assert_eq!(out.buf(), img.buf());
}

#[test]
fn luminance_search_finds_matching_reference() {
    let img = photo(40, 30);
    let pixels = img.buf();
    let own = Histogram::build(0.0, 255.0, 256, pixels.len(), |i| pixels[i].luminance()).buckets;

    let mut luminance = references(FilterKind::Luminance, 3);
    luminance[1].data = own;
    let corpus = Corpus::new(
        references(FilterKind::Details, 3),
        references(FilterKind::Zonal, 3),
        references(FilterKind::Saturation, 3),
        luminance,
    )
    .unwrap();
    let config = Config::default();
    let ctx = StageContext {
        corpus: &corpus,
        config: &config,
    };

    let fit = FilterKind::Luminance.fit(&ctx, img.as_ref(), Diapason::All);
    assert_eq!(fit.reference_index, 1);
    assert_eq!(fit.reference_id, 1);
    for x in [10.0, 64.0, 128.0, 200.0, 250.0] {
        let y = fit.spline.interpolate(x);
        assert!((y - x).abs() < 1e-6, "curve moved: s({x}) = {y}");
    }
}

#[test]
fn single_pixel_with_single_references_gives_one_variant() {
    let matcher = ToneMatcher::new(corpus(1), Config::default());
    let img = ImgVec::new(vec![Pixel::new(90.0, 120.0, 60.0)], 1, 1);
    let variants = matcher.variants(img.as_ref()).unwrap();
    assert_eq!(variants.len(), 1, "{:?}", variants.iter().map(|v| v.label()).collect::<Vec<_>>());
    assert_eq!(variants[0].choices.len(), 4);
}

#[test]
fn variants_are_distinct_and_stable_under_dedup() {
    let corpus = corpus(6);
    let matcher = ToneMatcher::new(corpus.clone(), Config::default());
    let img = photo(24, 16);
    let variants = matcher.variants(img.as_ref()).unwrap();
    assert!(!variants.is_empty());
    assert!(variants.len() <= Config::default().variants.max_output);

    for (i, a) in variants.iter().enumerate() {
        assert_eq!(a.choices.len(), 4);
        assert_eq!((a.raster.width(), a.raster.height()), (24, 16));
        for b in &variants[i + 1..] {
            assert!(!a.is_close_to(b, &corpus), "{} ~ {}", a.label(), b.label());
        }
    }

    let once = filter_close(variants, &corpus, 16);
    let labels: Vec<String> = once.iter().map(|v| v.label()).collect();
    let twice = filter_close(once, &corpus, 16);
    let again: Vec<String> = twice.iter().map(|v| v.label()).collect();
    assert_eq!(labels, again);
}

#[test]
fn disabled_details_stage_is_skipped() {
    let config = Config {
        details_enabled: false,
        ..Config::default()
    };
    let matcher = ToneMatcher::new(corpus(3), config);
    let variants = matcher.variants(photo(16, 12).as_ref()).unwrap();
    for v in &variants {
        assert!(v.fit(FilterKind::Details).is_none());
        assert_eq!(v.choices.len(), 3);
    }
}

#[test]
fn render_reapplies_curves() {
    let matcher = ToneMatcher::new(corpus(3), Config::default());
    let img = photo(20, 14);
    let variants = matcher.variants(img.as_ref()).unwrap();
    let rendered = matcher.render(img.as_ref(), &variants[0]).unwrap();
    assert_eq!((rendered.width(), rendered.height()), (20, 14));
    // Same input size and curves, so rendering reproduces the variant.
    for (a, b) in rendered.buf().iter().zip(variants[0].raster.buf()) {
        assert!((a.r - b.r).abs() < 1e-3 && (a.b - b.b).abs() < 1e-3, "{a:?} vs {b:?}");
    }
}

#[test]
fn direct_processing_keeps_geometry() {
    let matcher = ToneMatcher::new(corpus(4), Config::default());
    let img = photo(18, 12);
    let out = matcher.process_params(img.as_ref(), &["all", "low", "mid", "high"]).unwrap();
    assert_eq!((out.width(), out.height()), (18, 12));
    assert!(out.buf().iter().all(|p| p.r.is_finite() && p.g.is_finite() && p.b.is_finite()));
}

#[test]
fn unknown_diapason_is_rejected() {
    let matcher = ToneMatcher::new(corpus(2), Config::default());
    let img = photo(4, 4);
    match matcher.process_params(img.as_ref(), &["low", "mid", "bright", "high"]) {
        Err(Error::InvalidParameter(token)) => assert_eq!(token, "bright"),
        other => panic!("expected invalid parameter, got {other:?}"),
    }
    assert!(matches!(
        matcher.process_params(img.as_ref(), &["low", "mid"]),
        Err(Error::ParameterCount { .. })
    ));
}

#[test]
fn empty_image_is_rejected() {
    let matcher = ToneMatcher::new(corpus(2), Config::default());
    let variant = matcher.variants(photo(6, 4).as_ref()).unwrap().remove(0);
    // Zero rows; a zero width would be rejected by imgref itself.
    let img: ImgVec<Pixel> = ImgVec::new(Vec::new(), 4, 0);
    assert!(matches!(matcher.variants(img.as_ref()), Err(Error::EmptyRaster)));
    assert!(matches!(
        matcher.process(img.as_ref(), [Diapason::All; 4]),
        Err(Error::EmptyRaster)
    ));
    assert!(matches!(matcher.render(img.as_ref(), &variant), Err(Error::EmptyRaster)));
}

#[test]
fn corpus_directory_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let saved = corpus(21);
    saved.save_dir(dir.path()).unwrap();
    let loaded = Corpus::load_dir(dir.path()).unwrap();
    for kind in FilterKind::ALL {
        let a = saved.references(kind);
        let b = loaded.references(kind);
        assert_eq!(a.as_slice(), b.as_slice(), "{kind}");
        assert_eq!(a.median_quantum(), b.median_quantum());
    }
}

#[test]
fn missing_corpus_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    corpus(2).save_dir(dir.path()).unwrap();
    std::fs::remove_file(dir.path().join("zonal.ref")).unwrap();
    match Corpus::load_dir(dir.path()) {
        Err(Error::CorpusFile { path, .. }) => assert!(path.ends_with("zonal.ref")),
        other => panic!("expected missing file error, got {other:?}"),
    }
}

#[test]
fn truncated_corpus_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    corpus(5).save_dir(dir.path()).unwrap();
    let path = dir.path().join("luminance.ref");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 100]).unwrap();
    assert!(matches!(
        Corpus::load_dir(dir.path()),
        Err(Error::TruncatedCorpus { index: 4, count: 5 })
    ));
}
