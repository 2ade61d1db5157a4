use chrono::NaiveDate;
use haven_core::models::BookingTarget;
use rand::Rng;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 6;

/// Produces human-readable booking references such as `STAY-261201-K3X9QA`.
pub trait ReferenceSource: Send + Sync {
    fn next_reference(&self, target: &BookingTarget, today: NaiveDate) -> String;
}

pub fn prefix(target: &BookingTarget) -> &'static str {
    match target {
        BookingTarget::Stay { .. } => "STAY",
        BookingTarget::Experience { .. } => "EXP",
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomReferences;

impl ReferenceSource for RandomReferences {
    fn next_reference(&self, target: &BookingTarget, today: NaiveDate) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        format!("{}-{}-{}", prefix(target), today.format("%y%m%d"), suffix)
    }
}
