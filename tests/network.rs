#![cfg(feature = "optimization")]

mod common;

use common::*;
use microgrid_planner::blocks::network::{Coupling, Formulation};
use microgrid_planner::config::ModelSettings;
use microgrid_planner::SolveError;
use rstest::rstest;

fn settings(formulation: Formulation) -> ModelSettings {
    ModelSettings {
        formulation,
        ..ModelSettings::default()
    }
}

#[tokio::test]
async fn dc_line_rating_forces_unserved_energy() {
    let input = parse(two_bus(4, Some(3.0)));
    let (model, outcome) = solve(&input, &settings(Formulation::DcOpf)).await.unwrap();
    let outcome = outcome.into_optimal().unwrap();

    for t in 0..4 {
        assert_close(value(&model, &outcome, &format!("network.l12.flow[{t}]")), 0.03, 1e-7);
        assert_close(value(&model, &outcome, &format!("balance.n2.unserved[{t}]")), 2.0, 1e-6);
        assert_close(value(&model, &outcome, "network.n1.theta[0]"), 0.0, 1e-12);
    }
    // 3 kW imported at 0.20 plus 2 kW unserved at 10 per step.
    assert_close(outcome.objective.unwrap(), 4.0 * (3.0 * 0.2 + 2.0 * 10.0), 1e-5);
}

#[tokio::test]
async fn copper_plate_ignores_line_ratings() {
    let input = parse(two_bus(4, Some(3.0)));
    let (model, outcome) = solve(&input, &settings(Formulation::EconomicDispatch))
        .await
        .unwrap();
    let outcome = outcome.into_optimal().unwrap();
    assert!(model.program.find("network.l12.flow[0]").is_none());
    assert_close(outcome.objective.unwrap(), 4.0 * 5.0 * 0.2, 1e-6);
}

#[rstest]
#[case::relaxed(Coupling::Relaxed)]
#[case::exact(Coupling::Exact)]
#[tokio::test]
async fn linear_backend_refuses_conic_rows(#[case] coupling: Coupling) {
    let input = parse(two_bus(2, None));
    let settings = ModelSettings {
        formulation: Formulation::AcSocp,
        socp_coupling: coupling,
        ..ModelSettings::default()
    };
    let err = solve(&input, &settings).await.unwrap_err();
    match coupling {
        Coupling::Relaxed => assert_eq!(
            err,
            SolveError::Unsupported {
                backend: "microlp".into(),
                constraint: "network.n1-n2.coupling[0]".into()
            }
        ),
        Coupling::Exact => assert_eq!(
            err,
            SolveError::NonconvexNotEnabled {
                constraint: "network.n1-n2.coupling[0]".into()
            }
        ),
    }
}

#[cfg(feature = "conic")]
#[tokio::test]
async fn relaxed_socp_dispatch_solves_on_the_conic_backend() {
    let input = parse(two_bus(2, None));
    let settings = ModelSettings {
        formulation: Formulation::AcSocp,
        socp_coupling: Coupling::Relaxed,
        ..ModelSettings::default()
    };
    let (model, outcome) = solve_on(&input, &settings, "clarabel").await.unwrap();
    let outcome = outcome.into_optimal().unwrap();

    assert!(
        model.program.check(&outcome.values, 1e-5).is_empty(),
        "{:?}",
        model.program.check(&outcome.values, 1e-5)
    );
    for t in 0..2 {
        assert_close(value(&model, &outcome, &format!("balance.n2.unserved[{t}]")), 0.0, 1e-5);
        assert_close(value(&model, &outcome, &format!("network.n1.c[{t}]")), 1.0, 1e-12);

        // Minimum losses put the point on the cone surface.
        let c = value(&model, &outcome, &format!("network.n1-n2.c[{t}]"));
        let s = value(&model, &outcome, &format!("network.n1-n2.s[{t}]"));
        let far = value(&model, &outcome, &format!("network.n2.c[{t}]"));
        assert!(c * c + s * s <= far + 1e-5);
        assert_close(c * c + s * s, far, 1e-4);
    }
    // 5 kW imported at 0.20 per step, plus line losses.
    let objective = outcome.objective.unwrap();
    assert!((2.0 - 1e-5..2.02).contains(&objective), "objective {objective}");
}

#[tokio::test]
async fn economic_indicators_need_nonconvex_opt_in() {
    let input = parse(single_bus(2, 1.0));
    let settings = ModelSettings {
        economic_indicators: true,
        ..ModelSettings::default()
    };
    let err = solve(&input, &settings).await.unwrap_err();
    assert_eq!(
        err,
        SolveError::NonconvexNotEnabled {
            constraint: "economics.roi_def".into()
        }
    );
}
