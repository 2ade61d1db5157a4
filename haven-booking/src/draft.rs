use haven_catalog::PriceBreakdown;
use haven_core::models::{BookingTarget, DiscountApplication, GuestEntry, StayDates};
use haven_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the guest picked in the first step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    Stay {
        property_id: Uuid,
        stay: StayDates,
        guests: u32,
    },
    Experience {
        instance_id: Uuid,
        attendees: u32,
    },
}

impl Selection {
    pub fn party_size(&self) -> u32 {
        match self {
            Selection::Stay { guests, .. } => *guests,
            Selection::Experience { attendees, .. } => *attendees,
        }
    }

    pub fn target(&self) -> BookingTarget {
        match self {
            Selection::Stay {
                property_id, stay, ..
            } => BookingTarget::Stay {
                property_id: *property_id,
                check_in: stay.check_in(),
                check_out: stay.check_out(),
            },
            Selection::Experience { instance_id, .. } => BookingTarget::Experience {
                instance_id: *instance_id,
            },
        }
    }
}

/// Contact details as typed; validated when the booking is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInput {
    pub full_name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

/// Everything collected on the guest-details step, submitted as one form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub guests: Vec<GuestEntry>,
    pub contact: ContactInput,
    #[serde(default)]
    pub special_requests: Option<String>,
    #[serde(default)]
    pub billing_state: Option<String>,
}

/// Session-scoped accumulation of everything the booking flow has collected.
///
/// `revision` moves whenever an input that ends up in the booking row
/// changes; the quote itself does not count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingDraft {
    id: Uuid,
    selection: Option<Selection>,
    guests: Vec<GuestEntry>,
    contact: Option<ContactInput>,
    special_requests: Option<String>,
    billing_state: Option<String>,
    discount: Option<DiscountApplication>,
    quote: Option<PriceBreakdown>,
    revision: u64,
}

impl BookingDraft {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn guests(&self) -> &[GuestEntry] {
        &self.guests
    }

    pub fn contact(&self) -> Option<&ContactInput> {
        self.contact.as_ref()
    }

    pub fn special_requests(&self) -> Option<&str> {
        self.special_requests.as_deref()
    }

    pub fn billing_state(&self) -> Option<&str> {
        self.billing_state.as_deref()
    }

    pub fn discount(&self) -> Option<&DiscountApplication> {
        self.discount.as_ref()
    }

    pub fn quote(&self) -> Option<&PriceBreakdown> {
        self.quote.as_ref()
    }

    /// A new selection carries the discount that survived re-validation
    /// against it, and the quote for both.
    pub fn set_selection(
        &mut self,
        selection: Selection,
        discount: Option<DiscountApplication>,
        quote: PriceBreakdown,
    ) {
        self.selection = Some(selection);
        self.discount = discount;
        self.quote = Some(quote);
        self.touch();
    }

    pub fn set_guest_info(&mut self, info: GuestInfo, quote: PriceBreakdown) {
        self.set_guests(info.guests);
        self.set_contact(info.contact);
        self.set_special_requests(info.special_requests);
        self.set_billing_state(info.billing_state);
        self.quote = Some(quote);
    }

    fn set_guests(&mut self, guests: Vec<GuestEntry>) {
        if self.guests != guests {
            self.guests = guests;
            self.touch();
        }
    }

    fn set_contact(&mut self, contact: ContactInput) {
        if self.contact.as_ref() != Some(&contact) {
            self.contact = Some(contact);
            self.touch();
        }
    }

    fn set_special_requests(&mut self, notes: Option<String>) {
        if self.special_requests != notes {
            self.special_requests = notes;
            self.touch();
        }
    }

    fn set_billing_state(&mut self, state: Option<String>) {
        if self.billing_state != state {
            self.billing_state = state;
            self.touch();
        }
    }

    /// Swaps the applied discount together with the quote it produced.
    pub fn set_discount(&mut self, discount: Option<DiscountApplication>, quote: PriceBreakdown) {
        if self.discount != discount {
            self.discount = discount;
            self.touch();
        }
        self.quote = Some(quote);
    }

    /// Replaces the quote without touching the inputs.
    pub fn refresh_quote(&mut self, quote: PriceBreakdown) {
        self.quote = Some(quote);
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
