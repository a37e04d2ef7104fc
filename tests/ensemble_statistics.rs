use std::sync::Arc;

use ensemble_stats::statistics::AggregateKind;
use ensemble_stats::{
    ActiveCellIndex, CalculationStatus, CaseDataSource, CaseEnsemble, CaseId, EnsembleError, GridTopology,
    InMemoryCase, InMemoryCaseSource, NoProgress, PercentileConfig, PercentileMethod, PorosityModel, Project,
    ResultCategory, StatisticsError, SubGrid,
};

fn line_grid(cells: usize) -> Arc<GridTopology> {
    Arc::new(GridTopology::new(vec![SubGrid::new("MAIN", [cells, 1, 1])]).unwrap())
}

fn pressure_case(name: &str, flags: &[bool], values: Vec<f64>) -> InMemoryCase {
    let grid = line_grid(flags.len());
    let active = ActiveCellIndex::from_active_flags(&grid, flags).unwrap();
    let mut case = InMemoryCase::new(name, grid, active);
    case.add_result(PorosityModel::Matrix, ResultCategory::DynamicNative, "PRESSURE", vec![values])
        .unwrap();
    case
}

/// 两个 4 单元案例：A 有效 {0,1,2}，B 有效 {1,2,3}
fn two_case_ensemble(project: &Project) -> (InMemoryCaseSource, CaseEnsemble, Vec<CaseId>) {
    let source = InMemoryCaseSource::new();
    let a = source.insert(pressure_case("A", &[true, true, true, false], vec![10.0, 20.0, 30.0]));
    let b = source.insert(pressure_case("B", &[false, true, true, true], vec![21.0, 31.0, 41.0]));

    let mut ensemble = CaseEnsemble::new("Group 1");
    ensemble.add_case(a, &source, project.registry()).unwrap();
    ensemble.add_case(b, &source, project.registry()).unwrap();

    let stats = ensemble.statistics_cases()[0].id();
    ensemble
        .statistics_case_mut(stats)
        .unwrap()
        .set_selected_properties(PorosityModel::Matrix, ResultCategory::DynamicNative, vec!["PRESSURE".into()])
        .unwrap();
    (source, ensemble, vec![a, b])
}

#[test]
fn pressure_statistics_over_two_cases() {
    let project = Project::new();
    let (source, mut ensemble, _) = two_case_ensemble(&project);
    let stats = ensemble.statistics_cases()[0].id();

    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    let union = ensemble.union_active_cells(PorosityModel::Matrix);
    assert_eq!(union.active_global_cells(), &[0, 1, 2, 3]);

    let statistics_case = ensemble.statistics_case(stats).unwrap();
    assert_eq!(statistics_case.status(), CalculationStatus::Calculated);

    let mean: Vec<_> = (0..4)
        .map(|ordinal| statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Mean, ordinal))
        .collect();
    assert_eq!(mean, vec![Some(10.0), Some(20.5), Some(30.5), Some(41.0)]);

    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Min, 1), Some(20.0));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Max, 1), Some(21.0));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Min, 2), Some(30.0));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Max, 2), Some(31.0));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Range, 2), Some(1.0));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::StdDev, 0), Some(0.0));
}

#[test]
fn min_mean_max_are_ordered() {
    let project = Project::new();
    let (source, mut ensemble, _) = two_case_ensemble(&project);
    let stats = ensemble.statistics_cases()[0].id();
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    let statistics_case = ensemble.statistics_case(stats).unwrap();
    let min = statistics_case
        .aggregate_array(PorosityModel::Matrix, "PRESSURE", 0, AggregateKind::Min)
        .unwrap();
    let mean = statistics_case
        .aggregate_array(PorosityModel::Matrix, "PRESSURE", 0, AggregateKind::Mean)
        .unwrap();
    let max = statistics_case
        .aggregate_array(PorosityModel::Matrix, "PRESSURE", 0, AggregateKind::Max)
        .unwrap();
    for cell in 0..mean.len() {
        assert!(min[cell] <= mean[cell] && mean[cell] <= max[cell], "cell {}", cell);
    }
}

#[test]
fn mismatched_grid_is_rejected_and_union_unchanged() {
    let project = Project::new();
    let (source, mut ensemble, members) = two_case_ensemble(&project);
    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    let before = ensemble.union_active_cells(PorosityModel::Matrix).clone();

    let other = source.insert(pressure_case("C", &[true; 5], vec![1.0; 5]));
    let result = ensemble.add_case(other, &source, project.registry());

    match result {
        Err(EnsembleError::GridMismatch(mismatch)) => {
            assert_eq!(mismatch.case_id, other);
            assert!(mismatch.to_string().contains(&other.to_string()));
        }
        unexpected => panic!("expected grid mismatch, got {:?}", unexpected.err()),
    }
    assert_eq!(ensemble.members(), members.as_slice());
    assert!(!ensemble.is_union_stale());
    assert!(Arc::ptr_eq(&before, ensemble.union_active_cells(PorosityModel::Matrix)));
}

#[test]
fn union_is_idempotent_and_sound() {
    let project = Project::new();
    let (source, mut ensemble, members) = two_case_ensemble(&project);

    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    let first = ensemble.union_active_cells(PorosityModel::Matrix).active_global_cells().to_vec();
    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    let second = ensemble.union_active_cells(PorosityModel::Matrix).active_global_cells().to_vec();
    assert_eq!(first, second);

    let union = ensemble.union_active_cells(PorosityModel::Matrix);
    for &member in &members {
        let active = source.active_cell_index(member, PorosityModel::Matrix).unwrap();
        for &cell in active.active_global_cells() {
            assert!(union.is_active(cell));
        }
    }
    assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
    for (ordinal, &cell) in first.iter().enumerate() {
        assert_eq!(union.global_cell_index(ordinal), Some(cell));
        assert_eq!(union.cell_result_index(cell), Some(ordinal));
    }
}

#[test]
fn removing_and_re_adding_a_member_rebuilds_the_union() {
    let project = Project::new();
    let source = InMemoryCaseSource::new();
    let a = source.insert(pressure_case("A", &[true, false, true], vec![1.0, 2.0]));

    let mut ensemble = CaseEnsemble::new("Group 1");
    ensemble.add_case(a, &source, project.registry()).unwrap();
    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    let single = ensemble.union_active_cells(PorosityModel::Matrix).active_global_cells().to_vec();

    ensemble.remove_case(a).unwrap();
    assert!(ensemble.is_union_stale());
    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    assert!(ensemble.union_active_cells(PorosityModel::Matrix).is_empty());

    ensemble.add_case(a, &source, project.registry()).unwrap();
    ensemble.compute_union_of_active_cells(&source, &NoProgress);
    assert_eq!(ensemble.union_active_cells(PorosityModel::Matrix).active_global_cells(), single.as_slice());
}

#[test]
fn clearing_results_unlocks_selection() {
    let project = Project::new();
    let (source, mut ensemble, _) = two_case_ensemble(&project);
    let stats = ensemble.statistics_cases()[0].id();
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    let statistics_case = ensemble.statistics_case_mut(stats).unwrap();
    assert_eq!(
        statistics_case.set_selected_properties(PorosityModel::Matrix, ResultCategory::DynamicNative, vec![]),
        Err(StatisticsError::SelectionLocked)
    );

    statistics_case.clear_computed_statistics();
    assert_eq!(statistics_case.status(), CalculationStatus::NotCalculated);
    assert!(statistics_case.result_store().is_empty());
    assert!(statistics_case.grid_data().is_none());
    statistics_case
        .set_selected_properties(PorosityModel::Matrix, ResultCategory::DynamicNative, vec![])
        .unwrap();
}

#[test]
fn membership_change_invalidates_results() {
    let project = Project::new();
    let (source, mut ensemble, members) = two_case_ensemble(&project);
    let stats = ensemble.statistics_cases()[0].id();
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    ensemble.remove_case(members[1]).unwrap();
    let statistics_case = ensemble.statistics_case(stats).unwrap();
    assert_eq!(statistics_case.status(), CalculationStatus::NotCalculated);
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Mean, 0), None);
}

#[test]
fn single_member_nearest_percentiles_equal_the_sample() {
    let project = Project::new();
    let source = InMemoryCaseSource::new();
    let a = source.insert(pressure_case("A", &[true, true, true], vec![3.0, 7.0, 11.0]));

    let mut ensemble = CaseEnsemble::new("Group 1");
    ensemble.add_case(a, &source, project.registry()).unwrap();
    let stats = ensemble.statistics_cases()[0].id();
    {
        let statistics_case = ensemble.statistics_case_mut(stats).unwrap();
        statistics_case
            .set_selected_properties(PorosityModel::Matrix, ResultCategory::DynamicNative, vec!["PRESSURE".into()])
            .unwrap();
        statistics_case
            .set_percentiles(PercentileConfig {
                method: PercentileMethod::NearestObservation,
                ..PercentileConfig::default()
            })
            .unwrap();
    }
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    let statistics_case = ensemble.statistics_case(stats).unwrap();
    for (ordinal, expected) in [3.0, 7.0, 11.0].into_iter().enumerate() {
        for kind in [
            AggregateKind::PLow,
            AggregateKind::PMid,
            AggregateKind::PHigh,
            AggregateKind::Min,
            AggregateKind::Max,
            AggregateKind::Mean,
        ] {
            assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, kind, ordinal), Some(expected));
        }
    }
}

#[test]
fn project_round_trip_restores_results() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::new();
    let (source, mut ensemble, _) = two_case_ensemble(&project);
    let stats = ensemble.statistics_cases()[0].id();
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();
    let ensemble_id = ensemble.id();
    project.insert_ensemble(ensemble);
    project.save(dir.path()).unwrap();

    let restored = Project::new();
    assert_eq!(restored.load(dir.path(), &source).unwrap(), 1);

    let ensemble = restored.ensemble(ensemble_id).unwrap();
    let ensemble = ensemble.lock();
    assert_eq!(ensemble.members().len(), 2);
    let statistics_case = ensemble.statistics_case(stats).unwrap();
    assert_eq!(statistics_case.status(), CalculationStatus::Calculated);
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Mean, 1), Some(20.5));
    assert_eq!(statistics_case.aggregate_value("PRESSURE", 0, AggregateKind::Max, 3), Some(41.0));
}

#[test]
fn histogram_percentiles_lie_between_min_and_max() {
    let project = Project::new();
    let source = InMemoryCaseSource::new();
    let samples = [
        vec![1.0, -4.0, 100.0],
        vec![2.5, -1.0, 250.0],
        vec![7.0, -9.5, 100.0],
        vec![3.0, -2.0, 975.0],
        vec![9.75, -3.0, 400.0],
    ];

    let mut ensemble = CaseEnsemble::new("Group 1");
    for (index, values) in samples.iter().enumerate() {
        let case = source.insert(pressure_case(&format!("M{}", index), &[true; 3], values.clone()));
        ensemble.add_case(case, &source, project.registry()).unwrap();
    }
    let stats = ensemble.statistics_cases()[0].id();
    {
        let statistics_case = ensemble.statistics_case_mut(stats).unwrap();
        statistics_case
            .set_selected_properties(PorosityModel::Matrix, ResultCategory::DynamicNative, vec!["PRESSURE".into()])
            .unwrap();
        statistics_case
            .set_percentiles(PercentileConfig {
                method: PercentileMethod::HistogramEstimated,
                ..PercentileConfig::default()
            })
            .unwrap();
    }
    ensemble.compute_statistics(stats, &source, &NoProgress).unwrap();

    let statistics_case = ensemble.statistics_case(stats).unwrap();
    let array = |kind| {
        statistics_case
            .aggregate_array(PorosityModel::Matrix, "PRESSURE", 0, kind)
            .unwrap()
    };
    let (min, low, mid, high, max) = (
        array(AggregateKind::Min),
        array(AggregateKind::PLow),
        array(AggregateKind::PMid),
        array(AggregateKind::PHigh),
        array(AggregateKind::Max),
    );
    assert_eq!(mid.len(), 3);
    for cell in 0..3 {
        assert!(min[cell] <= low[cell], "cell {}: {} > {}", cell, min[cell], low[cell]);
        assert!(low[cell] <= mid[cell], "cell {}: {} > {}", cell, low[cell], mid[cell]);
        assert!(mid[cell] <= high[cell], "cell {}: {} > {}", cell, mid[cell], high[cell]);
        assert!(high[cell] <= max[cell], "cell {}: {} > {}", cell, high[cell], max[cell]);
    }
    assert_eq!(min[2], 100.0);
    assert_eq!(max[2], 975.0);
}
