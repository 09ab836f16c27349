//! Domain records (leads, contacts, deals), their write payloads and the users they reference.

use crate::activity::{ActivityModule, ChangeSet};
use crate::validate::{self, optional, required, ValidationError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Role of a CRM user. Users themselves are managed by the external auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UserRole {
    #[default]
    User,
    Agent,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
}

/// Display projection of a user (resolved `assignedTo`, `createdBy`, activity actor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// The three record kinds owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Lead,
    Contact,
    Deal,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Lead => "Lead",
            RecordKind::Contact => "Contact",
            RecordKind::Deal => "Deal",
        }
    }

    /// Collection / table key used by document stores.
    pub fn collection(self) -> &'static str {
        match self {
            RecordKind::Lead => "leads",
            RecordKind::Contact => "contacts",
            RecordKind::Deal => "deals",
        }
    }

    pub fn module(self) -> ActivityModule {
        match self {
            RecordKind::Lead => ActivityModule::Lead,
            RecordKind::Contact => ActivityModule::Contact,
            RecordKind::Deal => ActivityModule::Deal,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned provenance of a new record.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub id: String,
    pub created_by: String,
    pub now: DateTime<Utc>,
}

/// Ids a record points at; resolved to display projections at read time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordRefs<'a> {
    pub assigned_to: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub contact: Option<&'a str>,
    pub lead: Option<&'a str>,
}

/// Behaviour shared by every persisted record kind.
///
/// `SEARCH_FIELDS` and `FILTER_FIELDS` are wire (camelCase) field names; document stores
/// use them to build queries, in-memory stores use `search_values` / `attribute`.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Create/update payload. Every field is optional; `from_input` enforces what is required.
    type Input: Send + Sync + 'static;

    const KIND: RecordKind;
    const SEARCH_FIELDS: &'static [&'static str];
    const FILTER_FIELDS: &'static [&'static str];

    fn from_input(input: Self::Input, stamp: Stamp) -> Result<Self, ValidationError>;

    /// Applies a partial update in place and refreshes `updatedAt`.
    fn apply_input(
        &mut self,
        input: Self::Input,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError>;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;

    /// Human-readable snapshot used as the activity `recordTitle`.
    fn title(&self) -> String;

    /// Values of `SEARCH_FIELDS` that are present.
    fn search_values(&self) -> Vec<&str>;

    /// Value of one of `FILTER_FIELDS`.
    fn attribute(&self, field: &str) -> Option<&str>;

    fn refs(&self) -> RecordRefs<'_>;
    fn assigned_to_mut(&mut self) -> &mut Option<String>;

    fn change_set(before: Self, after: Self) -> ChangeSet;
}

// ---------------------------------------------------------------------------
// Lead

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LeadSource {
    Website,
    Referral,
    #[serde(rename = "Social Media")]
    SocialMedia,
    #[serde(rename = "Cold Call")]
    ColdCall,
    #[serde(rename = "Email Campaign")]
    EmailCampaign,
    #[default]
    Other,
}

impl LeadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadSource::Website => "Website",
            LeadSource::Referral => "Referral",
            LeadSource::SocialMedia => "Social Media",
            LeadSource::ColdCall => "Cold Call",
            LeadSource::EmailCampaign => "Email Campaign",
            LeadSource::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Unqualified,
    Converted,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Unqualified,
        LeadStatus::Converted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Contacted => "Contacted",
            LeadStatus::Qualified => "Qualified",
            LeadStatus::Unqualified => "Unqualified",
            LeadStatus::Converted => "Converted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub source: Option<LeadSource>,
    pub status: Option<LeadStatus>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

impl Record for Lead {
    type Input = LeadInput;

    const KIND: RecordKind = RecordKind::Lead;
    const SEARCH_FIELDS: &'static [&'static str] = &["firstName", "lastName", "email", "company"];
    const FILTER_FIELDS: &'static [&'static str] = &["status", "source", "assignedTo"];

    fn from_input(input: LeadInput, stamp: Stamp) -> Result<Self, ValidationError> {
        Ok(Lead {
            id: stamp.id,
            first_name: required("firstName", input.first_name)?,
            last_name: required("lastName", input.last_name)?,
            email: validate::email(input.email)?,
            phone: required("phone", input.phone)?,
            company: optional(input.company),
            job_title: optional(input.job_title),
            source: input.source.unwrap_or_default(),
            status: input.status.unwrap_or_default(),
            assigned_to: optional(input.assigned_to),
            notes: optional(input.notes),
            created_by: stamp.created_by,
            created_at: stamp.now,
            updated_at: stamp.now,
        })
    }

    fn apply_input(&mut self, input: LeadInput, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if input.first_name.is_some() {
            self.first_name = required("firstName", input.first_name)?;
        }
        if input.last_name.is_some() {
            self.last_name = required("lastName", input.last_name)?;
        }
        if input.email.is_some() {
            self.email = validate::email(input.email)?;
        }
        if input.phone.is_some() {
            self.phone = required("phone", input.phone)?;
        }
        if input.company.is_some() {
            self.company = optional(input.company);
        }
        if input.job_title.is_some() {
            self.job_title = optional(input.job_title);
        }
        if let Some(source) = input.source {
            self.source = source;
        }
        if let Some(status) = input.status {
            self.status = status;
        }
        if input.assigned_to.is_some() {
            self.assigned_to = optional(input.assigned_to);
        }
        if input.notes.is_some() {
            self.notes = optional(input.notes);
        }
        self.updated_at = now;
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn title(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn search_values(&self) -> Vec<&str> {
        let mut out = vec![
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.email.as_str(),
        ];
        out.extend(self.company.as_deref());
        out
    }

    fn attribute(&self, field: &str) -> Option<&str> {
        match field {
            "status" => Some(self.status.as_str()),
            "source" => Some(self.source.as_str()),
            "assignedTo" => self.assigned_to.as_deref(),
            _ => None,
        }
    }

    fn refs(&self) -> RecordRefs<'_> {
        RecordRefs {
            assigned_to: self.assigned_to.as_deref(),
            created_by: Some(&self.created_by),
            ..Default::default()
        }
    }

    fn assigned_to_mut(&mut self) -> &mut Option<String> {
        &mut self.assigned_to
    }

    fn change_set(before: Self, after: Self) -> ChangeSet {
        ChangeSet::Lead {
            before: Box::new(before),
            after: Box::new(after),
        }
    }
}

// ---------------------------------------------------------------------------
// Contact

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ContactType {
    #[default]
    Customer,
    Partner,
    Vendor,
    Other,
}

impl ContactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContactType::Customer => "Customer",
            ContactType::Partner => "Partner",
            ContactType::Vendor => "Vendor",
            ContactType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    fn normalized(self) -> Option<Address> {
        let a = Address {
            street: optional(self.street),
            city: optional(self.city),
            state: optional(self.state),
            zip_code: optional(self.zip_code),
            country: optional(self.country),
        };
        (a != Address::default()).then_some(a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(rename = "type", default)]
    pub contact_type: ContactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub address: Option<Address>,
    #[serde(rename = "type")]
    pub contact_type: Option<ContactType>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

impl Record for Contact {
    type Input = ContactInput;

    const KIND: RecordKind = RecordKind::Contact;
    const SEARCH_FIELDS: &'static [&'static str] = &["firstName", "lastName", "email", "company"];
    const FILTER_FIELDS: &'static [&'static str] = &["type", "assignedTo"];

    fn from_input(input: ContactInput, stamp: Stamp) -> Result<Self, ValidationError> {
        Ok(Contact {
            id: stamp.id,
            first_name: required("firstName", input.first_name)?,
            last_name: required("lastName", input.last_name)?,
            email: validate::email(input.email)?,
            phone: required("phone", input.phone)?,
            company: optional(input.company),
            job_title: optional(input.job_title),
            address: input.address.and_then(Address::normalized),
            contact_type: input.contact_type.unwrap_or_default(),
            assigned_to: optional(input.assigned_to),
            notes: optional(input.notes),
            created_by: stamp.created_by,
            created_at: stamp.now,
            updated_at: stamp.now,
        })
    }

    fn apply_input(
        &mut self,
        input: ContactInput,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if input.first_name.is_some() {
            self.first_name = required("firstName", input.first_name)?;
        }
        if input.last_name.is_some() {
            self.last_name = required("lastName", input.last_name)?;
        }
        if input.email.is_some() {
            self.email = validate::email(input.email)?;
        }
        if input.phone.is_some() {
            self.phone = required("phone", input.phone)?;
        }
        if input.company.is_some() {
            self.company = optional(input.company);
        }
        if input.job_title.is_some() {
            self.job_title = optional(input.job_title);
        }
        if let Some(address) = input.address {
            self.address = address.normalized();
        }
        if let Some(t) = input.contact_type {
            self.contact_type = t;
        }
        if input.assigned_to.is_some() {
            self.assigned_to = optional(input.assigned_to);
        }
        if input.notes.is_some() {
            self.notes = optional(input.notes);
        }
        self.updated_at = now;
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn title(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn search_values(&self) -> Vec<&str> {
        let mut out = vec![
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.email.as_str(),
        ];
        out.extend(self.company.as_deref());
        out
    }

    fn attribute(&self, field: &str) -> Option<&str> {
        match field {
            "type" => Some(self.contact_type.as_str()),
            "assignedTo" => self.assigned_to.as_deref(),
            _ => None,
        }
    }

    fn refs(&self) -> RecordRefs<'_> {
        RecordRefs {
            assigned_to: self.assigned_to.as_deref(),
            created_by: Some(&self.created_by),
            ..Default::default()
        }
    }

    fn assigned_to_mut(&mut self) -> &mut Option<String> {
        &mut self.assigned_to
    }

    fn change_set(before: Self, after: Self) -> ChangeSet {
        ChangeSet::Contact {
            before: Box::new(before),
            after: Box::new(after),
        }
    }
}

// ---------------------------------------------------------------------------
// Deal

/// Deal lifecycle stage. Any stage may follow any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DealStage {
    #[default]
    New,
    #[serde(rename = "In Progress")]
    InProgress,
    Won,
    Lost,
}

impl DealStage {
    pub const ALL: [DealStage; 4] = [
        DealStage::New,
        DealStage::InProgress,
        DealStage::Won,
        DealStage::Lost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DealStage::New => "New",
            DealStage::InProgress => "In Progress",
            DealStage::Won => "Won",
            DealStage::Lost => "Lost",
        }
    }

    /// Probability assumed when the caller does not supply one.
    pub fn default_probability(self) -> f64 {
        match self {
            DealStage::New => 10.0,
            DealStage::InProgress => 50.0,
            DealStage::Won => 100.0,
            DealStage::Lost => 0.0,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, DealStage::Won | DealStage::Lost)
    }
}

impl std::fmt::Display for DealStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: f64,
    #[serde(default)]
    pub stage: DealStage,
    pub probability: f64,
    pub expected_close_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_close_date: Option<DateTime<Utc>>,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lost_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub stage: Option<DealStage>,
    pub probability: Option<f64>,
    pub expected_close_date: Option<String>,
    pub contact: Option<String>,
    pub lead: Option<String>,
    pub assigned_to: Option<String>,
    pub lost_reason: Option<String>,
    pub notes: Option<String>,
}

impl Deal {
    /// Stamps `actualCloseDate` on the first entry into Won/Lost (never cleared afterwards)
    /// and derives probability from the stage unless the mutation supplied one.
    pub fn apply_stage_rules(&mut self, explicit_probability: bool, now: DateTime<Utc>) {
        if self.stage.is_closed() && self.actual_close_date.is_none() {
            self.actual_close_date = Some(now);
        }
        if !explicit_probability {
            self.probability = self.stage.default_probability();
        }
    }
}

impl Record for Deal {
    type Input = DealInput;

    const KIND: RecordKind = RecordKind::Deal;
    const SEARCH_FIELDS: &'static [&'static str] = &["title", "description"];
    const FILTER_FIELDS: &'static [&'static str] = &["stage", "assignedTo", "contact"];

    fn from_input(input: DealInput, stamp: Stamp) -> Result<Self, ValidationError> {
        let amount = input
            .amount
            .ok_or_else(|| ValidationError::new("Deal amount is required"))?;
        let explicit_probability = input.probability.is_some();
        let mut deal = Deal {
            id: stamp.id,
            title: required("title", input.title)?,
            description: optional(input.description),
            amount: validate::amount(amount)?,
            stage: input.stage.unwrap_or_default(),
            probability: input
                .probability
                .map(validate::probability)
                .transpose()?
                .unwrap_or_default(),
            expected_close_date: validate::timestamp(
                "expectedCloseDate",
                input.expected_close_date,
            )?,
            actual_close_date: None,
            contact: required("contact", input.contact)?,
            lead: optional(input.lead),
            assigned_to: optional(input.assigned_to),
            lost_reason: optional(input.lost_reason),
            notes: optional(input.notes),
            created_by: stamp.created_by,
            created_at: stamp.now,
            updated_at: stamp.now,
        };
        deal.apply_stage_rules(explicit_probability, stamp.now);
        Ok(deal)
    }

    fn apply_input(&mut self, input: DealInput, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if input.title.is_some() {
            self.title = required("title", input.title)?;
        }
        if input.description.is_some() {
            self.description = optional(input.description);
        }
        if let Some(amount) = input.amount {
            self.amount = validate::amount(amount)?;
        }
        if let Some(stage) = input.stage {
            self.stage = stage;
        }
        let explicit_probability = input.probability.is_some();
        if let Some(p) = input.probability {
            self.probability = validate::probability(p)?;
        }
        if input.expected_close_date.is_some() {
            self.expected_close_date =
                validate::timestamp("expectedCloseDate", input.expected_close_date)?;
        }
        if input.contact.is_some() {
            self.contact = required("contact", input.contact)?;
        }
        if input.lead.is_some() {
            self.lead = optional(input.lead);
        }
        if input.assigned_to.is_some() {
            self.assigned_to = Some(required("assignedTo", input.assigned_to)?);
        }
        if input.lost_reason.is_some() {
            self.lost_reason = optional(input.lost_reason);
        }
        if input.notes.is_some() {
            self.notes = optional(input.notes);
        }
        self.apply_stage_rules(explicit_probability, now);
        self.updated_at = now;
        Ok(())
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn search_values(&self) -> Vec<&str> {
        let mut out = vec![self.title.as_str()];
        out.extend(self.description.as_deref());
        out
    }

    fn attribute(&self, field: &str) -> Option<&str> {
        match field {
            "stage" => Some(self.stage.as_str()),
            "assignedTo" => self.assigned_to.as_deref(),
            "contact" => Some(&self.contact),
            _ => None,
        }
    }

    fn refs(&self) -> RecordRefs<'_> {
        RecordRefs {
            assigned_to: self.assigned_to.as_deref(),
            created_by: Some(&self.created_by),
            contact: Some(&self.contact),
            lead: self.lead.as_deref(),
        }
    }

    fn assigned_to_mut(&mut self) -> &mut Option<String> {
        &mut self.assigned_to
    }

    fn change_set(before: Self, after: Self) -> ChangeSet {
        ChangeSet::Deal {
            before: Box::new(before),
            after: Box::new(after),
        }
    }
}
