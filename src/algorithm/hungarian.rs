/// Minimum-cost perfect matching on a square cost matrix (Kuhn-Munkres with
/// row/column potentials, O(n³)). Returns, for each row, the matched column.
pub fn min_cost_assignment(costs: &[Vec<i64>]) -> Vec<usize> {
    let n = costs.len();
    if n == 0 {
        return Vec::new();
    }
    debug_assert!(costs.iter().all(|row| row.len() == n));

    // 1-indexed potentials; column 0 is the virtual start of each augmenting path.
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut matched_row = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for row in 1..=n {
        matched_row[0] = row;
        let mut column = 0;
        let mut min_slack = vec![i64::MAX; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[column] = true;
            let current_row = matched_row[column];
            let mut delta = i64::MAX;
            let mut next_column = 0;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let slack = costs[current_row - 1][j - 1] - u[current_row] - v[j];
                if slack < min_slack[j] {
                    min_slack[j] = slack;
                    way[j] = column;
                }
                if min_slack[j] < delta {
                    delta = min_slack[j];
                    next_column = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    min_slack[j] -= delta;
                }
            }

            column = next_column;
            if matched_row[column] == 0 {
                break;
            }
        }

        // Flip the augmenting path.
        loop {
            let previous = way[column];
            matched_row[column] = matched_row[previous];
            column = previous;
            if column == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0; n];
    for j in 1..=n {
        if matched_row[j] != 0 {
            assignment[matched_row[j] - 1] = j - 1;
        }
    }
    assignment
}
