//! Consistency contract between execution strategies

use std::collections::HashMap;

use intersection_sim::backends::{
    available_devices, build_world, select_device, strategy_for, AcceleratorBackend,
    DistributedBackend, ExecutionStrategy, KernelMover, LaunchConfig, SequentialBackend,
    VectorizedBackend,
};
use intersection_sim::runner::{run_scaling_experiment, run_single, ScalingParam};
use intersection_sim::simulation::{
    Direction, RoadNetwork, SignalConfig, SignalController, VehicleId, WorldParams, WorldState,
};
use intersection_sim::{get_backend, Backend, ConsistencyMode, ResultRecord, SimError, SimulationConfig};

fn random_scenario() -> SimulationConfig {
    SimulationConfig {
        total_time: 300.0,
        dt: 0.5,
        spawn_rate: 0.5,
        max_vehicles: 500,
        random_seed: 11,
        ..Default::default()
    }
}

/// Every direction spawns every tick, so spawns do not depend on movement
fn dense_scenario() -> SimulationConfig {
    SimulationConfig {
        total_time: 60.0,
        dt: 1.0,
        spawn_rate: 1.0,
        max_vehicles: 1000,
        green_ns: 30.0,
        green_ew: 30.0,
        all_red: 0.0,
        safe_gap: 5.0,
        max_speed: 10.0,
        lane_length: 100.0,
        random_seed: 1,
        ..Default::default()
    }
}

fn with_backend(config: &SimulationConfig, backend: Backend) -> SimulationConfig {
    SimulationConfig {
        backend,
        ..config.clone()
    }
}

fn assert_same_aggregates(a: &ResultRecord, b: &ResultRecord) {
    assert_eq!(a.vehicles_completed, b.vehicles_completed);
    assert!((a.avg_travel_time - b.avg_travel_time).abs() < 1e-9);
    assert!((a.avg_stops_per_vehicle - b.avg_stops_per_vehicle).abs() < 1e-9);
    assert!((a.throughput_veh_per_min - b.throughput_veh_per_min).abs() < 1e-9);
}

fn stat_u64(record: &ResultRecord, key: &str) -> u64 {
    record
        .stat(key)
        .and_then(|v| v.as_u64())
        .unwrap_or_else(|| panic!("missing stat {key}"))
}

fn stat_f64(record: &ResultRecord, key: &str) -> f64 {
    record
        .stat(key)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("missing stat {key}"))
}

#[test]
fn test_vectorized_matches_sequential() {
    let config = random_scenario();

    let mut sequential = SequentialBackend::new(config.clone()).unwrap();
    let seq = sequential.run().unwrap();

    let mut vectorized = VectorizedBackend::new(SimulationConfig {
        num_threads: 4,
        ..with_backend(&config, Backend::Vectorized)
    })
    .unwrap();
    let vec = vectorized.run().unwrap();

    assert!(seq.vehicles_completed > 0);
    assert_same_aggregates(&seq, &vec);
    assert_eq!(
        sequential.world().metrics().trips(),
        vectorized.world().metrics().trips()
    );
    assert_eq!(vec.backend, "vectorized");
    assert_eq!(stat_u64(&vec, "num_threads"), 4);
}

#[cfg(feature = "software-device")]
#[test]
fn test_ordered_accelerator_matches_sequential() {
    for config in [random_scenario(), dense_scenario()] {
        let mut sequential = SequentialBackend::new(config.clone()).unwrap();
        let seq = sequential.run().unwrap();

        let mut accel = AcceleratorBackend::new(SimulationConfig {
            consistency: ConsistencyMode::Ordered,
            accelerator_block_size: 32,
            ..with_backend(&config, Backend::Accelerator)
        })
        .unwrap();
        let acc = accel.run().unwrap();

        assert_same_aggregates(&seq, &acc);
        assert_eq!(
            sequential.world().metrics().trips(),
            accel.world().metrics().trips()
        );
    }
}

fn position_map(world: &WorldState) -> HashMap<VehicleId, f64> {
    world.vehicles().iter().map(|v| (v.id, v.position)).collect()
}

/// Largest per-vehicle position gap between the reference and a kernel run
#[cfg(feature = "software-device")]
fn max_trajectory_divergence(
    make_world: impl Fn() -> WorldState,
    ticks: u64,
    dt: f64,
    mode: ConsistencyMode,
) -> f64 {
    let device = select_device(available_devices(), 8).unwrap();
    let mut mover = KernelMover::new(
        device,
        LaunchConfig {
            block_size: 8,
            mode,
        },
    );
    let mut reference = make_world();
    let mut kernel = make_world();

    let mut worst: f64 = 0.0;
    for _ in 0..ticks {
        reference.step(dt);
        kernel.step_with(dt, &mut mover).unwrap();

        let expected = position_map(&reference);
        for (id, pos) in position_map(&kernel) {
            if let Some(ref_pos) = expected.get(&id) {
                worst = worst.max((pos - ref_pos).abs());
            }
        }
    }
    worst
}

#[cfg(feature = "software-device")]
#[test]
fn test_stale_leader_divergence_is_measured() {
    let config = dense_scenario();
    let make = || build_world(&config, config.random_seed);

    assert_eq!(
        max_trajectory_divergence(make, config.ticks(), config.dt, ConsistencyMode::Ordered),
        0.0
    );

    let divergence =
        max_trajectory_divergence(make, config.ticks(), config.dt, ConsistencyMode::StaleLeader);
    assert!(
        divergence > 0.0,
        "stale leaders in a discharging queue must lag the reference"
    );
    assert!(divergence <= config.lane_length + 20.0);

    // queues discharge one vehicle per tick instead of all at once
    let seq = run_single(&config).unwrap();
    let stale = run_single(&SimulationConfig {
        consistency: ConsistencyMode::StaleLeader,
        ..with_backend(&config, Backend::Accelerator)
    })
    .unwrap();
    assert_eq!(seq.vehicles_completed, 150);
    assert!(stale.vehicles_completed < seq.vehicles_completed);
    assert_eq!(stale.stat("consistency").and_then(|v| v.as_str()), Some("stale-leader"));
}

#[cfg(feature = "software-device")]
#[test]
fn test_stale_leader_agrees_for_isolated_vehicles() {
    // one vehicle per lane: nobody ever has a leader
    let make = || {
        let params = WorldParams {
            spawn_rate: 0.0,
            max_vehicles: 10,
            max_speed: 10.0,
            safe_gap: 5.0,
        };
        let mut world = WorldState::new(
            RoadNetwork::default(),
            SignalController::new(SignalConfig::default()),
            params,
            3,
        );
        for d in Direction::ALL {
            world.add_vehicle(d);
        }
        world
    };

    assert_eq!(
        max_trajectory_divergence(make, 80, 1.0, ConsistencyMode::StaleLeader),
        0.0
    );
}

#[cfg(feature = "software-device")]
#[test]
fn test_accelerator_reports_transfer_costs() {
    let config = SimulationConfig {
        total_time: 30.0,
        ..with_backend(&random_scenario(), Backend::Accelerator)
    };
    let mut accel = AcceleratorBackend::new(config.clone()).unwrap();
    let result = accel.run().unwrap();

    let transfer = accel.transfer_stats();
    assert_eq!(transfer.kernel_launches, config.ticks());
    assert!(transfer.bytes_transferred > 0);
    assert_eq!(stat_u64(&result, "kernel_launches"), transfer.kernel_launches);
    assert_eq!(stat_u64(&result, "bytes_transferred"), transfer.bytes_transferred);
    assert_eq!(result.stat("device").and_then(|v| v.as_str()), Some("software"));
}

#[cfg(feature = "software-device")]
#[test]
fn test_accelerator_launches_every_tick_on_an_empty_world() {
    let config = SimulationConfig {
        spawn_rate: 0.0,
        total_time: 15.0,
        ..with_backend(&random_scenario(), Backend::Accelerator)
    };
    let mut accel = AcceleratorBackend::new(config.clone()).unwrap();
    let result = accel.run().unwrap();

    let transfer = accel.transfer_stats();
    assert_eq!(transfer.kernel_launches, config.ticks());
    assert_eq!(transfer.bytes_transferred, 0, "an empty grid has nothing to copy");
    assert_eq!(stat_u64(&result, "kernel_launches"), config.ticks());
}

#[test]
fn test_unsupported_block_size_is_explicit_failure() {
    let config = SimulationConfig {
        accelerator_block_size: 1 << 20,
        ..with_backend(&random_scenario(), Backend::Accelerator)
    };

    let err = run_single(&config).unwrap_err();
    assert!(
        matches!(err, SimError::AcceleratorUnavailable(_)),
        "expected AcceleratorUnavailable, got {err}"
    );
}

#[test]
fn test_no_device_is_explicit_failure() {
    let err = select_device(Vec::new(), 256).err().unwrap();
    assert!(matches!(err, SimError::AcceleratorUnavailable(_)));
}

#[test]
fn test_distributed_single_rank_matches_sequential() {
    let config = random_scenario();
    let seq = run_single(&config).unwrap();
    let dist = run_single(&SimulationConfig {
        num_processes: 1,
        ..with_backend(&config, Backend::Distributed)
    })
    .unwrap();

    assert_same_aggregates(&seq, &dist);
    assert_eq!(stat_u64(&dist, "global_spawned"), stat_u64(&seq, "spawned"));
    for key in ["spawned", "active_at_end", "p50_travel_time", "p95_travel_time"] {
        assert_eq!(dist.stat(key), seq.stat(key), "diagnostic {key} differs");
    }
}

#[test]
fn test_distributed_reduction_sums_counts_and_maxes_wall_time() {
    let config = SimulationConfig {
        num_processes: 4,
        ..with_backend(&random_scenario(), Backend::Distributed)
    };
    let records = DistributedBackend::new(config).unwrap().run_all().unwrap();
    assert_eq!(records.len(), 4);

    let local_finished: u64 = records.iter().map(|r| stat_u64(r, "local_finished")).sum();
    let local_spawned: u64 = records.iter().map(|r| stat_u64(r, "local_spawned")).sum();
    let slowest = records
        .iter()
        .map(|r| stat_f64(r, "local_wall_time"))
        .fold(0.0, f64::max);

    for (rank, record) in records.iter().enumerate() {
        assert_eq!(stat_u64(record, "rank"), rank as u64);
        assert_eq!(record.vehicles_completed, local_finished);
        assert_eq!(stat_u64(record, "global_spawned"), local_spawned);
        assert_eq!(record.wall_time_seconds, slowest);
        assert_same_aggregates(record, &records[0]);

        let directions = record.stat("assigned_directions").unwrap();
        assert_eq!(directions.as_array().unwrap().len(), 1);
        assert_eq!(
            directions[0].as_str().unwrap(),
            Direction::ALL[rank].to_string()
        );
    }
}

/// Record with the keys that legitimately differ between ranks removed
fn without_rank_local_stats(record: &ResultRecord) -> ResultRecord {
    let mut shared = record.clone();
    shared
        .extra_stats
        .retain(|key, _| !key.starts_with("local_") && key != "rank" && key != "assigned_directions");
    shared
}

#[test]
fn test_every_rank_returns_the_group_record() {
    let config = SimulationConfig {
        num_processes: 4,
        ..with_backend(&random_scenario(), Backend::Distributed)
    };
    let records = DistributedBackend::new(config).unwrap().run_all().unwrap();

    let local_active: u64 = records
        .iter()
        .map(|r| stat_u64(r, "local_active_at_end"))
        .sum();
    let shared = without_rank_local_stats(&records[0]);
    assert!(shared.stat("p50_travel_time").unwrap().is_f64());

    for record in &records {
        assert_eq!(stat_u64(record, "spawned"), stat_u64(record, "global_spawned"));
        assert_eq!(stat_u64(record, "active_at_end"), local_active);
        assert_eq!(without_rank_local_stats(record), shared);
    }
    assert!(stat_u64(&records[0], "local_spawned") < stat_u64(&records[0], "spawned"));
}

#[test]
fn test_distributed_statistics_agree_with_sequential() {
    // independent streams per rank, so only the long-run averages can agree
    let config = SimulationConfig {
        total_time: 3600.0,
        dt: 0.5,
        spawn_rate: 0.5,
        max_vehicles: 2000,
        random_seed: 11,
        ..Default::default()
    };
    let seq = run_single(&config).unwrap();
    let dist = run_single(&SimulationConfig {
        num_processes: 4,
        ..with_backend(&config, Backend::Distributed)
    })
    .unwrap();

    let close = |name: &str, a: f64, b: f64, tolerance: f64| {
        let relative = (a - b).abs() / a.abs().max(f64::EPSILON);
        assert!(
            relative <= tolerance,
            "{name}: sequential {a} vs distributed {b} ({:.1}% apart)",
            relative * 100.0
        );
    };
    assert!(seq.vehicles_completed > 5000);
    close("throughput", seq.throughput_veh_per_min, dist.throughput_veh_per_min, 0.06);
    close("avg travel time", seq.avg_travel_time, dist.avg_travel_time, 0.06);
    close("avg stops", seq.avg_stops_per_vehicle, dist.avg_stops_per_vehicle, 0.08);
}

#[test]
fn test_idle_ranks_still_join_the_collective() {
    let config = SimulationConfig {
        num_processes: 6,
        total_time: 60.0,
        ..with_backend(&random_scenario(), Backend::Distributed)
    };
    let records = DistributedBackend::new(config).unwrap().run_all().unwrap();
    assert_eq!(records.len(), 6);

    for idle in &records[4..] {
        assert_eq!(stat_u64(idle, "local_spawned"), 0);
        assert_eq!(stat_u64(idle, "local_finished"), 0);
        assert!(idle.stat("assigned_directions").unwrap().as_array().unwrap().is_empty());
        assert_same_aggregates(idle, &records[0]);
    }
}

#[test]
fn test_unknown_backend_fails_before_running() {
    let err = get_backend("openmp").unwrap_err();
    match err {
        SimError::UnknownBackend { name, valid } => {
            assert_eq!(name, "openmp");
            assert_eq!(valid, "sequential, vectorized, distributed, accelerator");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_every_backend_handles_a_run_without_traffic() {
    let quiet = SimulationConfig {
        spawn_rate: 0.0,
        total_time: 20.0,
        num_processes: 2,
        num_threads: 2,
        ..Default::default()
    };

    for backend in Backend::ALL {
        // exhaustive on purpose: a new backend must be added here
        let expected_name = match backend {
            Backend::Sequential => "sequential",
            Backend::Vectorized => "vectorized",
            Backend::Distributed => "distributed",
            Backend::Accelerator => "accelerator",
        };
        if backend == Backend::Accelerator && available_devices().is_empty() {
            continue;
        }

        let mut strategy = strategy_for(&with_backend(&quiet, backend)).unwrap();
        assert_eq!(strategy.backend(), backend);

        let result = strategy.run().unwrap();
        assert_eq!(result.backend, expected_name);
        assert_eq!(result.vehicles_completed, 0);
        assert_eq!(result.avg_travel_time, 0.0);
        assert_eq!(result.avg_stops_per_vehicle, 0.0);
        assert_eq!(result.throughput_veh_per_min, 0.0);
        assert_eq!(result.total_simulated_time, 20.0);
    }
}

#[test]
fn test_scaling_experiment_varies_one_knob() {
    let base = SimulationConfig {
        total_time: 60.0,
        ..random_scenario()
    };
    let results =
        run_scaling_experiment(&base, Backend::Vectorized, ScalingParam::NumThreads, &[1, 2, 3])
            .unwrap();

    assert_eq!(results.len(), 3);
    for (record, threads) in results.iter().zip([1u64, 2, 3]) {
        assert_eq!(record.backend, "vectorized");
        assert_eq!(stat_u64(record, "num_threads"), threads);
        assert_same_aggregates(record, &results[0]);
    }
}
