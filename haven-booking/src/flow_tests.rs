use haven_catalog::GstBreakdown;
use haven_core::models::{BookingStatus, GuestEntry, PaymentStatus};
use haven_core::payment::IntentStatus;
use haven_core::{Actor, CoreError};
use haven_security::validation::is_well_formed_reference;

use crate::flow::{FlowStep, Session};
use crate::testkit::{date, guest_info, pay, stay_at_summary, Harness};

fn user(id: &str) -> Session {
    Session::Authenticated {
        user_id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
    }
}

#[tokio::test]
async fn test_three_night_stay_quote() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    assert_eq!(flow.step(), FlowStep::Idle);

    let quote = flow
        .select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap()
        .clone();

    assert_eq!(flow.step(), FlowStep::SelectingDates);
    assert_eq!(quote.base_price_minor, 900_000);
    assert_eq!(quote.additional_guest_charge_minor, 50_000);
    assert_eq!(quote.subtotal_after_discount_minor, 950_000);
    assert_eq!(quote.tax_amount_minor, 171_000);
    assert_eq!(
        quote.gst,
        Some(GstBreakdown::IntraState {
            cgst_minor: 85_500,
            sgst_minor: 85_500
        })
    );
    assert_eq!(quote.total_amount_due_minor, 1_121_000);
}

#[tokio::test]
async fn test_same_day_checkout_rejected_before_any_query() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);

    let err = flow
        .select_stay(h.villa.id, date("2026-12-01"), date("2026-12-01"), 2)
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("check_out"));

    let err = flow
        .select_stay(h.villa.id, date("2026-12-04"), date("2026-12-01"), 2)
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("check_out"));

    assert_eq!(h.store.availability_queries(), 0);
    assert_eq!(flow.step(), FlowStep::Idle);
    assert!(flow.draft().quote().is_none());
}

#[tokio::test]
async fn test_unavailable_dates_keep_flow_in_place() {
    let h = Harness::new().await;
    h.store
        .block_dates(h.villa.id, date("2026-12-02"), date("2026-12-03"))
        .await;
    let mut flow = h.stay_flow(Session::Anonymous);
    flow.start().unwrap();

    let err = flow
        .select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unavailable(_)));
    assert_eq!(flow.step(), FlowStep::SelectingDates);
    assert!(flow.draft().selection().is_none());
    assert!(flow.continue_to_guest_info().is_err());

    flow.select_stay(h.villa.id, date("2026-12-03"), date("2026-12-05"), 2)
        .await
        .unwrap();
    assert_eq!(flow.continue_to_guest_info().unwrap(), FlowStep::GuestInfo);
}

#[tokio::test]
async fn test_signup_discount_apply_and_remove() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    let before = flow
        .select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap()
        .clone();

    let application = flow.apply_discount("signup5").await.unwrap();
    assert!(application.is_valid);
    assert_eq!(application.discount_amount_minor, 47_500);

    let discounted = flow.draft().quote().unwrap().clone();
    assert_eq!(discounted.subtotal_after_discount_minor, 902_500);
    assert_eq!(discounted.tax_amount_minor, 162_450);
    assert_eq!(discounted.total_amount_due_minor, 1_064_950);

    let after = flow.remove_discount().await.unwrap().clone();
    assert_eq!(after, before);
    assert!(flow.draft().discount().is_none());
}

#[tokio::test]
async fn test_invalid_code_leaves_draft_untouched() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap();
    let revision = flow.draft().revision();

    let application = flow.apply_discount("NOSUCHCODE").await.unwrap();
    assert!(!application.is_valid);
    assert!(application.reason.is_some());
    assert_eq!(flow.draft().revision(), revision);
    assert_eq!(flow.draft().quote().unwrap().discount_amount_minor, 0);
}

#[tokio::test]
async fn test_empty_guest_name_never_reaches_summary() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap();
    flow.continue_to_guest_info().unwrap();

    flow.set_guest_info(guest_info("asha@example.com", "+919876543210", &["Asha", " "]))
        .await
        .unwrap();
    let err = flow.continue_to_summary().unwrap_err();
    assert_eq!(err.field(), Some("guests[1].name"));
    assert_eq!(flow.step(), FlowStep::GuestInfo);

    let mut info = guest_info("asha@example.com", "+919876543210", &["Asha"]);
    info.guests[0].age = Some(130);
    flow.set_guest_info(info).await.unwrap();
    assert_eq!(flow.continue_to_summary().unwrap_err().field(), Some("guests[0].age"));

    // One named guest for a party of three
    flow.set_guest_info(guest_info("asha@example.com", "+919876543210", &["Asha"]))
        .await
        .unwrap();
    assert_eq!(flow.continue_to_summary().unwrap_err().field(), Some("guests"));
    assert_eq!(flow.step(), FlowStep::GuestInfo);

    let mut info = guest_info("asha@example.com", "+919876543210", &["Asha", "Kabir", "Meera"]);
    info.guests[1] = GuestEntry {
        name: "Kabir".into(),
        age: Some(0),
    };
    flow.set_guest_info(info).await.unwrap();
    assert_eq!(flow.continue_to_summary().unwrap(), FlowStep::Summary);
}

#[tokio::test]
async fn test_invalid_phone_stops_at_guest_info() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 2)
        .await
        .unwrap();
    flow.continue_to_guest_info().unwrap();
    flow.set_guest_info(guest_info("asha@example.com", "abc", &["Asha", "Kabir"]))
        .await
        .unwrap();

    let err = flow.continue_to_summary().unwrap_err();
    assert_eq!(err.field(), Some("phone"));
    assert!(h.store.bookings().await.is_empty());
}

#[tokio::test]
async fn test_guest_booking_end_to_end_with_retry() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, Session::Anonymous, "Asha@Example.com").await;

    let persisted = flow.continue_to_payment().await.unwrap();
    assert_eq!(flow.step(), FlowStep::Payment);
    assert!(is_well_formed_reference(&persisted.booking_reference));
    assert!(persisted.booking_reference.starts_with("STAY-261101-"));

    let bookings = h.store.bookings().await;
    assert_eq!(bookings.len(), 1);
    let booking = &bookings[0];
    assert_eq!(booking.user_id, None);
    assert_eq!(booking.contact.email.expose(), "asha@example.com");
    assert_eq!(booking.special_requests.as_deref(), Some("Late check-in please"));
    assert_eq!(booking.amounts.total_minor, 1_121_000);
    assert_eq!(booking.booking_status, BookingStatus::Pending);
    assert_eq!(h.store.confirmations().await.len(), 1);

    let first = flow.start_payment().await.unwrap();
    assert_eq!(first.amount_minor, 1_121_000);
    assert_eq!(first.currency, "INR");

    h.gateway.set_outcome(&first.intent_id, IntentStatus::Failed);
    let failed = flow.complete_payment(&first.intent_id).await.unwrap();
    assert!(!failed.succeeded());
    assert_eq!(flow.step(), FlowStep::Payment);
    let booking = h.store.bookings().await.remove(0);
    assert_eq!(booking.payment_status, PaymentStatus::Failed);
    assert_eq!(booking.booking_status, BookingStatus::Pending);

    let second = flow.start_payment().await.unwrap();
    assert_ne!(second.intent_id, first.intent_id);
    h.gateway.set_outcome(&second.intent_id, IntentStatus::Succeeded);
    let paid = flow.complete_payment(&second.intent_id).await.unwrap();
    assert!(paid.succeeded());
    assert_eq!(flow.step(), FlowStep::Confirmation);

    let booking = h.store.bookings().await.remove(0);
    assert_eq!(booking.payment_status, PaymentStatus::Paid);
    assert_eq!(booking.booking_status, BookingStatus::Confirmed);
    assert_eq!(h.store.payments().await.len(), 2);

    assert!(matches!(
        flow.back().unwrap_err(),
        CoreError::InvalidTransition { .. }
    ));
}

#[tokio::test]
async fn test_pending_payment_does_not_confirm() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;
    flow.continue_to_payment().await.unwrap();
    let handoff = flow.start_payment().await.unwrap();

    h.gateway.set_outcome(&handoff.intent_id, IntentStatus::Processing);
    let outcome = flow.complete_payment(&handoff.intent_id).await.unwrap();
    assert_eq!(outcome.payment_status, PaymentStatus::Pending);
    assert_eq!(flow.step(), FlowStep::Payment);
}

#[tokio::test]
async fn test_back_preserves_input() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;
    let quote = flow.draft().quote().cloned();

    assert_eq!(flow.back().unwrap(), FlowStep::GuestInfo);
    assert_eq!(flow.back().unwrap(), FlowStep::SelectingDates);
    assert_eq!(flow.draft().guests().len(), 3);
    assert_eq!(
        flow.draft().contact().unwrap().email.expose(),
        "asha@example.com"
    );
    assert_eq!(flow.draft().quote().cloned(), quote);

    assert_eq!(flow.continue_to_guest_info().unwrap(), FlowStep::GuestInfo);
    assert_eq!(flow.continue_to_summary().unwrap(), FlowStep::Summary);

    assert_eq!(flow.back().unwrap(), FlowStep::GuestInfo);
    assert_eq!(flow.back().unwrap(), FlowStep::SelectingDates);
    assert_eq!(flow.back().unwrap(), FlowStep::Idle);
    assert!(flow.back().is_err());
}

#[tokio::test]
async fn test_unchanged_draft_reuses_pending_booking() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;

    let first = flow.continue_to_payment().await.unwrap();
    flow.back().unwrap();
    let again = flow.continue_to_payment().await.unwrap();
    assert_eq!(again.booking_id, first.booking_id);
    assert_eq!(h.store.bookings().await.len(), 1);

    // Changing the guest details supersedes the earlier booking.
    flow.back().unwrap();
    flow.back().unwrap();
    let mut info = guest_info("asha@example.com", "+919876543210", &["Asha", "Kabir", "Meera"]);
    info.special_requests = Some("Ground floor room".into());
    flow.set_guest_info(info).await.unwrap();
    flow.continue_to_summary().unwrap();
    let replaced = flow.continue_to_payment().await.unwrap();
    assert_ne!(replaced.booking_id, first.booking_id);

    let bookings = h.store.bookings().await;
    assert_eq!(bookings.len(), 2);
    let old = bookings.iter().find(|b| b.id == first.booking_id).unwrap();
    assert_eq!(old.booking_status, BookingStatus::Cancelled);
}

#[tokio::test]
async fn test_stale_quote_is_refreshed_before_submission() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;
    let quoted_at = flow.draft().quote().unwrap().quoted_at;

    h.advance(901);
    let err = flow.continue_to_payment().await.unwrap_err();
    assert_eq!(err.field(), Some("quote"));
    assert_eq!(flow.step(), FlowStep::Summary);
    assert!(flow.draft().quote().unwrap().quoted_at > quoted_at);
    assert!(h.store.bookings().await.is_empty());

    flow.continue_to_payment().await.unwrap();
    assert_eq!(flow.step(), FlowStep::Payment);
}

#[tokio::test]
async fn test_signup_code_dropped_for_returning_guest_at_submission() {
    let h = Harness::new().await;
    let mut first = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;
    pay(&h, &mut first).await;

    let mut flow = h.stay_flow(Session::Anonymous);
    flow.select_stay(h.villa.id, date("2027-01-10"), date("2027-01-13"), 3)
        .await
        .unwrap();
    // No contact yet, so the first-booking check is deferred.
    assert!(flow.apply_discount("SIGNUP5").await.unwrap().is_valid);
    flow.continue_to_guest_info().unwrap();
    flow.set_guest_info(guest_info(
        "asha@example.com",
        "+919876543210",
        &["Asha", "Kabir", "Meera"],
    ))
    .await
    .unwrap();
    flow.continue_to_summary().unwrap();

    let err = flow.continue_to_payment().await.unwrap_err();
    assert_eq!(err.field(), Some("discount_code"));
    assert_eq!(flow.step(), FlowStep::Summary);
    assert!(flow.draft().discount().is_none());
    assert_eq!(
        flow.draft().quote().unwrap().total_amount_due_minor,
        1_121_000
    );

    flow.continue_to_payment().await.unwrap();
    assert_eq!(flow.step(), FlowStep::Payment);
}

#[tokio::test]
async fn test_authenticated_booking_is_owned_by_user() {
    let h = Harness::new().await;
    let mut flow = stay_at_summary(&h, user("u-1"), "asha@example.com").await;
    pay(&h, &mut flow).await;

    let booking = h.store.bookings().await.remove(0);
    assert_eq!(booking.user_id.as_deref(), Some("u-1"));
    assert!(booking.is_accessible_by(&Actor::user("u-1", None)));
    assert!(!booking.is_accessible_by(&Actor::guest("asha@example.com")));
}

#[tokio::test]
async fn test_experience_flow_tracks_attendees() {
    let h = Harness::new().await;
    let mut flow = h.experience_flow(Session::Anonymous);

    let err = flow.select_experience(h.trek.id, 0).await.unwrap_err();
    assert_eq!(err.field(), Some("attendees"));
    assert_eq!(h.store.availability_queries(), 0);

    let full = flow.select_experience(h.trek.id, 4).await.unwrap_err();
    assert!(matches!(full, CoreError::Unavailable(_)));

    let quote = flow.select_experience(h.trek.id, 3).await.unwrap().clone();
    assert_eq!(quote.base_price_minor, 360_000);
    assert_eq!(quote.total_amount_due_minor, 424_800);
    assert!(flow.apply_discount("SIGNUP5").await.is_err());

    flow.continue_to_guest_info().unwrap();
    flow.set_guest_info(guest_info(
        "nina@example.com",
        "+14155550134",
        &["Nina", "Omar", "Priya"],
    ))
    .await
    .unwrap();
    flow.continue_to_summary().unwrap();
    pay(&h, &mut flow).await;
    assert_eq!(h.store.instance(h.trek.id).await.unwrap().current_attendees, 10);

    let booking_id = flow.booking().unwrap().booking_id;
    let cancelled = h
        .services
        .persister
        .cancel_booking(&Actor::guest("nina@example.com"), booking_id, h.now())
        .await
        .unwrap();
    assert_eq!(cancelled.booking_status, BookingStatus::Cancelled);
    assert_eq!(h.store.instance(h.trek.id).await.unwrap().current_attendees, 7);
}

#[tokio::test]
async fn test_flow_kind_is_enforced() {
    let h = Harness::new().await;
    let mut stay = h.stay_flow(Session::Anonymous);
    assert_eq!(
        stay.select_experience(h.trek.id, 1).await.unwrap_err().field(),
        Some("selection")
    );

    let mut experience = h.experience_flow(Session::Anonymous);
    assert_eq!(
        experience
            .select_stay(h.villa.id, date("2026-12-01"), date("2026-12-02"), 1)
            .await
            .unwrap_err()
            .field(),
        Some("selection")
    );
}

#[tokio::test]
async fn test_steps_cannot_be_skipped() {
    let h = Harness::new().await;
    let mut flow = h.stay_flow(Session::Anonymous);
    assert!(flow.continue_to_guest_info().is_err());
    assert!(flow.continue_to_summary().is_err());
    assert!(flow.continue_to_payment().await.is_err());
    assert!(flow.start_payment().await.is_err());
    assert!(flow.complete_payment("mock_pi_x").await.is_err());
    assert_eq!(flow.step(), FlowStep::Idle);
}
