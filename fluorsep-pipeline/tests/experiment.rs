//! End-to-end pipeline tests over a small synthetic recording.

use approx::assert_relative_eq;
use ndarray::{Array2, Array3};
use tempfile::TempDir;

use fluorsep_core::{BufferSink, Reporter, RoiShape, RoiSpec, SeparationConfig, StackSource};
use fluorsep_io::{write_stack, PixelType, PREPARED_FILE};
use fluorsep_pipeline::Experiment;

const IMAGE: (usize, usize) = (30, 30);
const FRAMES: usize = 40;
const N_TRIALS: usize = 3;

/// Two square cells with distinct temporal signals over a slowly varying
/// background.
fn synthetic_stack(trial: usize) -> Array3<f64> {
    Array3::from_shape_fn((FRAMES, IMAGE.0, IMAGE.1), |(f, r, c)| {
        let p = (trial * FRAMES + f) as f64 * 0.13;
        let background = 1.0 + 0.3 * ((p * 0.29).sin() + 1.0);
        let mut value = background;
        if (5..9).contains(&r) && (5..9).contains(&c) {
            value += 8.0 * (3.0 + (p.sin() * 2.0).max(0.0));
        }
        if (18..22).contains(&r) && (18..22).contains(&c) {
            value += 8.0 * (2.0 + (p * 0.7).cos().abs());
        }
        value
    })
}

fn square_mask(top: usize, left: usize, size: usize) -> RoiShape {
    let mut mask = Array2::from_elem(IMAGE, false);
    for r in top..top + size {
        for c in left..left + size {
            mask[[r, c]] = true;
        }
    }
    RoiShape::Mask(mask)
}

fn rois() -> RoiSpec {
    RoiSpec::Cells(vec![square_mask(5, 5, 4), square_mask(18, 18, 4)])
}

fn stacks() -> Vec<StackSource> {
    (0..N_TRIALS)
        .map(|t| StackSource::Frames(synthetic_stack(t)))
        .collect()
}

fn config() -> SeparationConfig {
    SeparationConfig::default()
        .with_max_iter(3000)
        .with_tol(1e-4)
}

fn quiet(verbosity: u8) -> (Reporter, BufferSink) {
    let sink = BufferSink::new();
    (Reporter::with_sink(verbosity, sink.clone()), sink)
}

#[test]
fn test_end_to_end_shapes() {
    let (reporter, _) = quiet(0);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_reporter(reporter)
        .build()
        .unwrap();
    experiment.separate(false, false).unwrap();

    let raw = experiment.raw().unwrap();
    let result = experiment.result().unwrap();
    assert_eq!(raw.n_cells(), 2);
    assert_eq!(raw.n_trials(), N_TRIALS);
    assert_eq!(result.n_cells(), 2);
    for cell in 0..2 {
        for trial in 0..N_TRIALS {
            assert_eq!(raw.get(cell, trial).dim(), (5, FRAMES));
            assert_eq!(result.get(cell, trial).dim(), (5, FRAMES));
        }
    }
    assert_eq!(experiment.mixmat().unwrap().len(), 2);
    assert_eq!(experiment.info().unwrap().len(), 2);
    assert_eq!(experiment.means().unwrap().len(), N_TRIALS);
}

#[test]
fn test_separation_is_deterministic() {
    let run = || {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
        experiment.result().unwrap().clone()
    };
    let a = run();
    let b = run();
    for cell in 0..a.n_cells() {
        for trial in 0..a.n_trials() {
            for (x, y) in a.get(cell, trial).iter().zip(b.get(cell, trial).iter()) {
                assert_relative_eq!(*x, *y, max_relative = 1e-5);
            }
        }
    }
}

#[test]
fn test_cache_reload_skips_recompute() {
    let dir = TempDir::new().unwrap();
    {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_folder(dir.path())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
    }
    let prepared_before = std::fs::read(dir.path().join("prepared.json")).unwrap();
    let separated_before = std::fs::read(dir.path().join("separated.json")).unwrap();

    let (reporter, sink) = quiet(1);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(sink.contents().contains("Reloading data from cache"));
    assert!(experiment.raw().is_some());
    assert!(experiment.result().is_some());

    experiment.separate(false, false).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("prepared.json")).unwrap(),
        prepared_before
    );
    assert_eq!(
        std::fs::read(dir.path().join("separated.json")).unwrap(),
        separated_before
    );
    // A cached run emits no fresh phase summaries.
    assert!(!sink.contents().contains("Finished separating"));
}

#[test]
fn test_corrupt_cache_recovers() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(PREPARED_FILE), b"{ not json").unwrap();

    let (reporter, sink) = quiet(1);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(sink.contents().contains("An error occurred while loading"));
    assert!(experiment.raw().is_none());

    experiment.separate(false, false).unwrap();
    assert!(experiment.result().is_some());
    // The bad archive got replaced by a valid one.
    let (reporter, sink) = quiet(1);
    let reloaded = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(sink.contents().contains("Reloading data from cache"));
    assert!(reloaded.result().is_some());
}

#[test]
fn test_prep_notices_cache_broken_after_build() {
    let dir = TempDir::new().unwrap();
    let (reporter, sink) = quiet(1);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    // The archive only turns up (broken) once the experiment exists, so
    // the extraction phase itself has to notice and fall back.
    std::fs::write(dir.path().join(PREPARED_FILE), b"{ not json").unwrap();
    experiment.separation_prep(false).unwrap();
    assert!(sink.contents().contains("An error occurred while loading"));
    assert!(experiment.raw().is_some());
}

#[test]
fn test_phases_pick_up_archives_written_after_build() {
    let dir = TempDir::new().unwrap();
    let (reporter, sink) = quiet(1);
    let mut late = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    {
        let (other, _) = quiet(0);
        let mut first = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_folder(dir.path())
            .with_reporter(other)
            .build()
            .unwrap();
        first.separate(false, false).unwrap();
    }
    // Both phases reload the sibling's archives instead of recomputing.
    late.separate(false, false).unwrap();
    assert!(sink.contents().contains("Reloading data from cache"));
    assert!(!sink.contents().contains("Finished"));
    assert!(late.raw().is_some());
    assert!(late.result().is_some());
}

#[test]
fn test_changed_parameters_invalidate_prepared_cache() {
    let dir = TempDir::new().unwrap();
    {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_folder(dir.path())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separation_prep(false).unwrap();
    }
    let (reporter, sink) = quiet(1);
    let experiment = Experiment::builder(stacks(), rois())
        .with_config(config().with_n_regions(6))
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(experiment.raw().is_none());
    assert!(!sink.contents().contains("Reloading data"));
}

#[test]
fn test_changed_config_invalidates_separated_cache() {
    let dir = TempDir::new().unwrap();
    {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_folder(dir.path())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
    }
    // Same extraction parameters, different separation ones: the prepared
    // archive is still good, the separated one is stale.
    let (reporter, _) = quiet(0);
    let experiment = Experiment::builder(stacks(), rois())
        .with_config(config().with_alpha(0.2))
        .with_folder(dir.path())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(experiment.raw().is_some());
    assert!(experiment.result().is_none());
}

#[test]
fn test_verbosity_levels() {
    for (verbosity, expect_finished, expect_progress) in
        [(0, false, false), (1, true, false), (3, true, true)]
    {
        let (reporter, sink) = quiet(verbosity);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
        let output = sink.contents();
        assert_eq!(output.contains("Finished"), expect_finished);
        assert_eq!(output.contains("[Extraction 1/3]"), expect_progress);
        assert_eq!(output.contains("[Separation 1/2]"), expect_progress);
    }
}

#[test]
fn test_low_memory_matches_eager() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<_> = (0..N_TRIALS)
        .map(|t| {
            let path = dir.path().join(format!("trial{t}.fsk"));
            write_stack(&path, &synthetic_stack(t), PixelType::F64).unwrap();
            path
        })
        .collect();
    let sources = || -> Vec<StackSource> {
        paths.iter().map(|p| StackSource::Path(p.clone())).collect()
    };

    let extract = |low_memory: bool| {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(sources(), rois())
            .with_config(config())
            .with_low_memory(low_memory)
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separation_prep(false).unwrap();
        experiment.raw().unwrap().clone()
    };
    assert_eq!(extract(false), extract(true));
}

#[test]
fn test_sequential_matches_parallel() {
    let run = |ncores: usize| {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_ncores_preparation(ncores)
            .with_ncores_separation(ncores)
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
        experiment.result().unwrap().clone()
    };
    assert_eq!(run(1), run(2));
}

#[test]
fn test_deltaf_shapes_and_redo() {
    let (reporter, _) = quiet(0);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_reporter(reporter)
        .build()
        .unwrap();
    experiment.separate(false, false).unwrap();
    experiment.calc_deltaf(10.0, true, true).unwrap();

    let deltaf_raw = experiment.deltaf_raw().unwrap();
    let deltaf_result = experiment.deltaf_result().unwrap();
    assert_eq!(deltaf_raw.n_cells(), 2);
    assert_eq!(deltaf_result.n_trials(), N_TRIALS);
    assert_eq!(deltaf_raw.get(0, 0).dim(), (5, FRAMES));
    // Baselines are positive here, so df/f0 stays finite.
    assert!(deltaf_raw
        .iter_cells()
        .flatten()
        .all(|t| t.iter().all(|x| x.is_finite())));

    // Redoing separation drops stale df/f0.
    experiment.separate(false, true).unwrap();
    assert!(experiment.deltaf_raw().is_none());
    assert!(experiment.deltaf_result().is_none());
}

#[test]
fn test_export_csv_and_json() {
    let dir = TempDir::new().unwrap();
    let (reporter, _) = quiet(0);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_reporter(reporter)
        .build()
        .unwrap();
    experiment.separate(false, false).unwrap();

    let csv_path = dir.path().join("traces.csv");
    experiment.to_csv(Some(&csv_path)).unwrap();
    let text = std::fs::read_to_string(&csv_path).unwrap();
    assert!(text.starts_with("# n_regions=4\n"));
    assert!(text.contains("\nfield,cell,trial,row,frame,value\n"));
    assert!(text.contains("\nresult,1,2,"));
    assert!(text.contains("\nmixmat,0,0,"));

    let json_path = dir.path().join("traces.json");
    experiment.to_json(Some(&json_path)).unwrap();
    let value: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(&json_path).unwrap()).unwrap();
    assert!(value["raw"]["cell0"]["trial0"].is_array());
    assert!(value["result"]["cell1"]["trial2"].is_array());
    assert!(value["mixmat"]["cell0"].is_array());
}

#[test]
fn test_export_before_extraction_is_error() {
    let (reporter, _) = quiet(0);
    let experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_reporter(reporter)
        .build()
        .unwrap();
    let path = std::env::temp_dir().join("never.csv");
    assert!(experiment.to_csv(Some(&path)).is_err());
}

#[test]
fn test_explicit_load_restores_state() {
    let dir = TempDir::new().unwrap();
    {
        let (reporter, _) = quiet(0);
        let mut experiment = Experiment::builder(stacks(), rois())
            .with_config(config())
            .with_folder(dir.path())
            .with_reporter(reporter)
            .build()
            .unwrap();
        experiment.separate(false, false).unwrap();
    }
    let (reporter, _) = quiet(0);
    let mut experiment = Experiment::builder(stacks(), rois())
        .with_config(config())
        .with_reporter(reporter)
        .build()
        .unwrap();
    assert!(experiment.result().is_none());
    // No folder configured, so the source must be explicit.
    assert!(experiment.load(None).is_err());
    experiment.load(Some(dir.path())).unwrap();
    assert!(experiment.raw().is_some());
    assert!(experiment.result().is_some());
    assert_eq!(experiment.n_cells(), Some(2));
}
