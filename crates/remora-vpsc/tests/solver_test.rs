use remora_vpsc::{Constraint, Error, Solver, Variable, project};

fn lcg(seed: &mut u64) -> f64 {
    *seed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*seed >> 11) as f64) / ((1u64 << 53) as f64)
}

#[test]
fn two_variables_match_the_closed_form_projection() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(0.5, 1.0)];
    let cons = [Constraint::new(0, 1, 2.0)];
    let x = project(&vars, &cons).unwrap();
    assert!((x[0] + 0.75).abs() < 1e-12, "x0: {}", x[0]);
    assert!((x[1] - 1.25).abs() < 1e-12, "x1: {}", x[1]);
}

#[test]
fn satisfied_constraints_leave_desired_positions_alone() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(5.0, 1.0)];
    let cons = [Constraint::new(0, 1, 2.0)];
    let x = project(&vars, &cons).unwrap();
    assert_eq!(x, vec![0.0, 5.0]);
}

#[test]
fn equality_constraint_is_tight_even_when_slack() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(10.0, 1.0)];
    let cons = [Constraint::equality(0, 1, 3.0)];
    let x = project(&vars, &cons).unwrap();
    assert!((x[0] - 3.5).abs() < 1e-12);
    assert!((x[1] - 6.5).abs() < 1e-12);
}

#[test]
fn heavy_variables_barely_move() {
    let vars = [Variable::new(0.0, 1000.0), Variable::new(0.0, 1.0)];
    let cons = [Constraint::new(0, 1, 10.0)];
    let x = project(&vars, &cons).unwrap();
    assert!(x[0] > -0.011 && x[0] < 0.0, "x0: {}", x[0]);
    assert!((x[1] - x[0] - 10.0).abs() < 1e-9);
}

#[test]
fn random_feasible_systems_are_satisfied() {
    let mut seed = 7u64;
    for _ in 0..20 {
        let n = 30;
        let vars: Vec<Variable> = (0..n)
            .map(|_| Variable::new(lcg(&mut seed) * 100.0, 0.5 + lcg(&mut seed)))
            .collect();
        let mut cons = Vec::new();
        for i in 0..n - 1 {
            cons.push(Constraint::new(i, i + 1, 5.0));
        }
        for i in (0..n - 3).step_by(2) {
            cons.push(Constraint::new(i, i + 3, 12.0 + lcg(&mut seed) * 10.0));
        }
        cons.push(Constraint::equality(4, 9, 40.0));

        let mut solver = Solver::new(&vars, &cons).unwrap();
        let x = solver.solve();
        assert!(solver.unsatisfiable().is_empty());
        for c in &cons {
            assert!(c.is_satisfied(&x, 1e-9 * (1.0 + x[c.right].abs())), "{c:?}");
        }
    }
}

#[test]
fn solve_is_never_worse_than_satisfy() {
    let mut seed = 99u64;
    let vars: Vec<Variable> = (0..20)
        .map(|_| Variable::new(lcg(&mut seed) * 50.0, 1.0))
        .collect();
    let cons: Vec<Constraint> = (0..19).map(|i| Constraint::new(i, i + 1, 4.0)).collect();

    let mut satisfied = Solver::new(&vars, &cons).unwrap();
    satisfied.satisfy();
    let mut solved = Solver::new(&vars, &cons).unwrap();
    let x = solved.solve();

    assert!(solved.cost() <= satisfied.cost() + 1e-9);
    for c in &cons {
        assert!(c.is_satisfied(&x, 1e-9));
    }
}

#[test]
fn cyclic_constraints_terminate_and_are_reported() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(0.0, 1.0)];
    let cons = [Constraint::new(0, 1, 1.0), Constraint::new(1, 0, 1.0)];
    let mut solver = Solver::new(&vars, &cons).unwrap();
    let x = solver.solve();
    assert_eq!(solver.unsatisfiable(), vec![1]);
    assert!((x[1] - x[0] - 1.0).abs() < 1e-12);
}

#[test]
fn conflicting_equalities_keep_the_first_declared() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(0.0, 1.0)];
    let cons = [Constraint::equality(0, 1, 1.0), Constraint::equality(0, 1, 3.0)];
    let mut solver = Solver::new(&vars, &cons).unwrap();
    let x = solver.solve();
    assert_eq!(solver.unsatisfiable(), vec![1]);
    assert!((x[1] - x[0] - 1.0).abs() < 1e-12);
}

#[test]
fn duplicate_equalities_are_not_reported() {
    let vars = [Variable::new(0.0, 1.0), Variable::new(0.0, 1.0)];
    let cons = [Constraint::equality(0, 1, 2.0), Constraint::equality(0, 1, 2.0)];
    let mut solver = Solver::new(&vars, &cons).unwrap();
    let x = solver.solve();
    assert!(solver.unsatisfiable().is_empty());
    assert!((x[1] - x[0] - 2.0).abs() < 1e-12);
}

#[test]
fn out_of_range_variable_is_rejected() {
    let vars = [Variable::new(0.0, 1.0)];
    let cons = [Constraint::new(0, 3, 1.0)];
    match Solver::new(&vars, &cons) {
        Err(Error::VariableOutOfRange {
            constraint,
            variable,
            count,
        }) => assert_eq!((constraint, variable, count), (0, 3, 1)),
        other => panic!("unexpected result: {other:?}"),
    }
}
