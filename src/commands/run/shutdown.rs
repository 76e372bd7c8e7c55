use crate::{core::grouping::GroupingStats, error::TupleError, utils::util::Result};
use std::{any::Any, thread};

fn panic_payload_message(panic_payload: &(dyn Any + Send + 'static)) -> String {
    if let Some(message) = panic_payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = panic_payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_owned()
}

fn join_thread_result<T>(thread_name: &str, handle: thread::JoinHandle<Result<T>>) -> Result<T> {
    match handle.join() {
        Ok(result) => result.map_err(|e| crate::tuple_error!("{thread_name} thread failed: {e}")),
        Err(panic_payload) => Err(crate::tuple_error!(
            "{thread_name} thread panicked: {}",
            panic_payload_message(panic_payload.as_ref())
        )),
    }
}

/// Reports the reduce error first; a writer failure is usually its consequence.
fn aggregate_errors(errors: Vec<TupleError>) -> Result<()> {
    let mut errors = errors.into_iter();
    let Some(first) = errors.next() else {
        return Ok(());
    };
    let rest: Vec<String> = errors.map(|e| e.to_string()).collect();
    if rest.is_empty() {
        return Err(first);
    }
    let summary = std::iter::once(first.to_string())
        .chain(rest)
        .enumerate()
        .map(|(index, error)| format!("{}. {}", index + 1, error))
        .collect::<Vec<_>>()
        .join("; ");
    Err(crate::tuple_error!("Multiple job errors: {summary}"))
}

/// Joins the writer after the reduce side has dropped its sender.
pub(crate) fn finalize_run(
    reduce_result: Result<GroupingStats>,
    writer_thread: thread::JoinHandle<Result<u64>>,
) -> Result<(GroupingStats, u64)> {
    let writer_result = join_thread_result("Writer", writer_thread);
    match (reduce_result, writer_result) {
        (Ok(stats), Ok(written)) => {
            log::debug!("Writer thread joined successfully.");
            Ok((stats, written))
        }
        (reduce, writer) => {
            let errors = [reduce.err(), writer.err()].into_iter().flatten().collect();
            aggregate_errors(errors)?;
            Err(crate::tuple_error!("Job failed without an error report"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_reports_panics() {
        let handle = thread::spawn(|| -> Result<()> { panic!("writer exploded") });
        let err = join_thread_result("Writer", handle).expect_err("panicking thread");
        assert_eq!(err.to_string(), "Writer thread panicked: writer exploded");

        let handle = thread::spawn(|| -> Result<()> { Err(crate::tuple_error!("disk full")) });
        let err = join_thread_result("Writer", handle).expect_err("failing thread");
        assert_eq!(err.to_string(), "Writer thread failed: disk full");
    }

    #[test]
    fn test_finalize_reports_both_sides() {
        let writer = thread::spawn(|| -> Result<u64> { Ok(3) });
        let (stats, written) =
            finalize_run(Ok(GroupingStats { groups: 2, records: 3 }), writer).expect("clean run");
        assert_eq!((stats.groups, written), (2, 3));

        let writer = thread::spawn(|| -> Result<u64> { Err(crate::tuple_error!("broken pipe")) });
        let err = finalize_run(Err(crate::tuple_error!("bad group")), writer).expect_err("both fail");
        assert_eq!(
            err.to_string(),
            "Multiple job errors: 1. bad group; 2. Writer thread failed: broken pipe"
        );
    }

    #[test]
    fn test_aggregate_errors() {
        assert!(aggregate_errors(Vec::new()).is_ok());
        let single = aggregate_errors(vec![TupleError::NoSources]).expect_err("one error");
        assert!(matches!(single, TupleError::NoSources));
        let many = aggregate_errors(vec![crate::tuple_error!("a"), crate::tuple_error!("b")])
            .expect_err("two errors");
        assert_eq!(many.to_string(), "Multiple job errors: 1. a; 2. b");
    }
}
