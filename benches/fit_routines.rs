use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xrfmaps::fitting::{
    create_routine, fit_parameters, LmfitOptimizer, OptimizerOptions, RoiFitRoutine,
};
use xrfmaps::{
    ElementRegistry, ElementTables, EnergyRange, FitElements, FitParameters, FitParamsPreset,
    FitRoutine, OptimizerKind, RoutineKind, SpectraModel, Spectrum,
};

fn make_elements() -> FitElements {
    let registry = ElementRegistry::load(ElementTables::reference_k_lines()).unwrap();
    FitElements::from_names(&registry, &["Ca", "Fe", "Cu", "Zn"])
}

fn make_spectrum(elements: &FitElements) -> Spectrum {
    let mut params = FitParameters::new();
    for (i, element) in elements.iter().enumerate() {
        params.set_value(&element.name, 1000.0 * (i as f64 + 1.0));
    }
    SpectraModel::new(params).model_spectrum(elements, EnergyRange::full(2048))
}

fn bench_pixel_routines(c: &mut Criterion) {
    let elements = make_elements();
    let spectrum = make_spectrum(&elements);
    let model = SpectraModel::default();
    let range = model.energy_range(1.0, 12.0, spectrum.len());

    let mut group = c.benchmark_group("fit_pixel");
    group.bench_function("roi", |b| {
        let roi = RoiFitRoutine::default();
        b.iter(|| roi.fit_spectra(&model, black_box(&spectrum), &elements))
    });
    for kind in [RoutineKind::Svd, RoutineKind::Nnls] {
        let mut routine = create_routine(kind, OptimizerKind::Lmfit);
        routine.initialize(&model, &elements, range);
        group.bench_function(kind.name(), |b| {
            b.iter(|| routine.fit_spectra(&model, black_box(&spectrum), &elements))
        });
    }
    group.finish();
}

fn bench_parameter_fit(c: &mut Criterion) {
    let elements = make_elements();
    let spectrum = make_spectrum(&elements);
    let model = SpectraModel::default();
    let range = model.energy_range(1.0, 12.0, spectrum.len());
    let optimizer = LmfitOptimizer::new(OptimizerOptions::default());

    c.bench_function("lmfit_batch_no_tails", |b| {
        b.iter(|| {
            fit_parameters(
                &model,
                black_box(&spectrum),
                &elements,
                range,
                FitParamsPreset::BatchFitNoTails,
                &optimizer,
            )
        })
    });
}

criterion_group!(benches, bench_pixel_routines, bench_parameter_fit);
criterion_main!(benches);
