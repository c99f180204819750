use crate::{AnnotatedData, PipelineError, Result};
use log::{debug, warn};
use ndarray::{Array2, Axis, Ix4, Ix5, Slice};

/// Position inside a group whose label represents the whole group.
///
/// For even group sizes this is the later of the two middle windows.
pub fn center_index(group_size: usize) -> usize {
    group_size / 2
}

/// Group consecutive spectrogram windows for time-distributed models.
///
/// `[n, time, freq, axes]` becomes `[n / G, G, time, freq, axes]`; the
/// `n % G` trailing windows are dropped. Each group takes the label of its
/// centre window and the other labels are discarded.
pub fn time_distribute(data: AnnotatedData<Ix4>, group_size: usize) -> Result<AnnotatedData<Ix5>> {
    if group_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "time distribution group size must be at least 1".to_string(),
        ));
    }

    let (examples, labels) = data.into_parts();
    let (windows, time_bins, freq_bins, axes) = examples.dim();
    let groups = windows / group_size;
    let kept = groups * group_size;

    if kept < windows {
        warn!(
            "dropping {} trailing spectrogram windows that do not fill a group of {}",
            windows - kept,
            group_size
        );
    }

    let trimmed = examples
        .slice_axis(Axis(0), Slice::from(..kept))
        .as_standard_layout()
        .into_owned();
    let grouped = trimmed.into_shape_with_order((groups, group_size, time_bins, freq_bins, axes))?;

    let center = center_index(group_size);
    let group_labels = Array2::from_shape_fn((groups, 1), |(g, _)| labels[[g * group_size + center, 0]]);

    debug!(
        "time-distributed {} windows into {} groups of {} (centre index {})",
        windows, groups, group_size, center
    );

    AnnotatedData::new(grouped, group_labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array4};

    fn indexed(windows: usize, labels: &[u8]) -> AnnotatedData<Ix4> {
        let examples = Array4::from_shape_fn((windows, 3, 2, 6), |(w, t, f, a)| {
            (w * 1000 + t * 100 + f * 10 + a) as f64
        });
        let labels = Array2::from_shape_vec((windows, 1), labels.to_vec()).unwrap();
        AnnotatedData::new(examples, labels).unwrap()
    }

    #[test]
    fn truncates_to_whole_groups() {
        let data = indexed(12, &[0; 12]);
        let grouped = time_distribute(data, 5).unwrap();
        assert_eq!(grouped.examples().dim(), (2, 5, 3, 2, 6));
        assert_eq!(grouped.labels().dim(), (2, 1));
    }

    #[test]
    fn keeps_window_order_within_groups() {
        let data = indexed(10, &[0; 10]);
        let grouped = time_distribute(data, 5).unwrap();
        let ex = grouped.examples();
        assert_eq!(ex[[1, 2, 1, 0, 4]], 7104.0);
        assert_eq!(ex.slice(s![0, 4, .., .., ..])[[2usize, 1, 5]], 4215.0);
    }

    #[test]
    fn selects_centre_label() {
        let per_window: Vec<u8> = vec![0, 0, 1, 0, 0, 1, 1, 0, 1, 1, 0, 0, 0, 0, 1];
        let data = indexed(per_window.len(), &per_window);
        let grouped = time_distribute(data, 5).unwrap();
        let expected: Vec<u8> = per_window.chunks(5).map(|g| g[2]).collect();
        let got: Vec<u8> = grouped.labels().iter().copied().collect();
        assert_eq!(got, expected);
        assert_eq!(got, vec![1, 1, 0]);
    }

    #[test]
    fn even_group_centre_leans_late() {
        assert_eq!(center_index(4), 2);
        let data = indexed(4, &[0, 1, 0, 0]);
        let grouped = time_distribute(data, 4).unwrap();
        assert_eq!(grouped.labels()[[0, 0]], 0);

        let data = indexed(4, &[0, 0, 1, 0]);
        let grouped = time_distribute(data, 4).unwrap();
        assert_eq!(grouped.labels()[[0, 0]], 1);
    }

    #[test]
    fn fewer_windows_than_group_gives_empty_output() {
        let data = indexed(3, &[1, 1, 1]);
        let grouped = time_distribute(data, 5).unwrap();
        assert!(grouped.is_empty());
        assert_eq!(grouped.example_shape(), &[5, 3, 2, 6]);
    }

    #[test]
    fn zero_group_size_is_rejected() {
        assert!(time_distribute(indexed(2, &[0, 0]), 0).is_err());
    }
}
