//! Access policy: a Casbin enforcer fed from one static role table, plus the
//! ownership predicates that need the target record.

use casbin::{CoreApi, DefaultModel, MemoryAdapter, MgmtApi};
use derive_more::Display;
use log::{debug, error};
use strum_macros::EnumIter;
use thiserror::Error;

use crate::models::{Actor, Appointment, Invoice, Patient, Role, User};

const MODEL: &str = r#"
[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && r.obj == p.obj && r.act == p.act
"#;

/// Every operation gated by the role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display)]
pub enum Operation {
    ListPatients,
    SearchPatients,
    ReadPatient,
    CreatePatient,
    UpdatePatient,
    DeletePatient,
    ListAppointments,
    CreateAppointment,
    UpdateAppointment,
    DeleteAppointment,
    ReadPatientAppointments,
    ReadAssignedAppointments,
    UpdateAppointmentStatus,
    ReadHistory,
    CreateHistory,
    UpdateHistory,
    DeleteHistory,
    ListInvoices,
    ReadInvoice,
    CreateInvoice,
    PayInvoice,
    ListUsers,
    UpdateUserRole,
    UpdateUserStatus,
    DeleteUser,
    ReadAuditLog,
    ReadReports,
    ReadProfile,
    UpdateProfile,
}

impl Operation {
    /// Casbin object and action of the operation.
    pub fn policy(self) -> (&'static str, &'static str) {
        use Operation::*;
        match self {
            ListPatients => ("patient", "list"),
            SearchPatients => ("patient", "search"),
            ReadPatient => ("patient", "read"),
            CreatePatient => ("patient", "create"),
            UpdatePatient => ("patient", "update"),
            DeletePatient => ("patient", "delete"),
            ListAppointments => ("appointment", "list"),
            CreateAppointment => ("appointment", "create"),
            UpdateAppointment => ("appointment", "update"),
            DeleteAppointment => ("appointment", "delete"),
            ReadPatientAppointments => ("appointment", "read-by-patient"),
            ReadAssignedAppointments => ("appointment", "read-assigned"),
            UpdateAppointmentStatus => ("appointment", "update-status"),
            ReadHistory => ("history", "read"),
            CreateHistory => ("history", "create"),
            UpdateHistory => ("history", "update"),
            DeleteHistory => ("history", "delete"),
            ListInvoices => ("invoice", "list"),
            ReadInvoice => ("invoice", "read"),
            CreateInvoice => ("invoice", "create"),
            PayInvoice => ("invoice", "pay"),
            ListUsers => ("user", "list"),
            UpdateUserRole => ("user", "update-role"),
            UpdateUserStatus => ("user", "update-status"),
            DeleteUser => ("user", "delete"),
            ReadAuditLog => ("audit-log", "read"),
            ReadReports => ("report", "read"),
            ReadProfile => ("profile", "read"),
            UpdateProfile => ("profile", "update"),
        }
    }
}

const ADMIN: &[Role] = &[Role::Admin];
const DESK: &[Role] = &[Role::Admin, Role::Staff];
const CLINICAL: &[Role] = &[Role::Admin, Role::Staff, Role::Doctor];
const EVERYONE: &[Role] = &[Role::Admin, Role::Staff, Role::Doctor, Role::User];

/// Roles allowed to perform each operation. The only source of the policy.
pub static ROLE_MATRIX: &[(Operation, &[Role])] = &[
    (Operation::ListPatients, DESK),
    (Operation::SearchPatients, DESK),
    (Operation::ReadPatient, EVERYONE),
    (Operation::CreatePatient, DESK),
    (Operation::UpdatePatient, DESK),
    (Operation::DeletePatient, DESK),
    (Operation::ListAppointments, DESK),
    (Operation::CreateAppointment, DESK),
    (Operation::UpdateAppointment, DESK),
    (Operation::DeleteAppointment, DESK),
    (Operation::ReadPatientAppointments, &[Role::Admin, Role::Staff, Role::User]),
    (Operation::ReadAssignedAppointments, &[Role::Staff, Role::Doctor]),
    (Operation::UpdateAppointmentStatus, &[Role::Doctor]),
    (Operation::ReadHistory, EVERYONE),
    (Operation::CreateHistory, CLINICAL),
    (Operation::UpdateHistory, CLINICAL),
    (Operation::DeleteHistory, DESK),
    (Operation::ListInvoices, EVERYONE),
    (Operation::ReadInvoice, EVERYONE),
    (Operation::CreateInvoice, &[Role::Doctor]),
    (Operation::PayInvoice, DESK),
    (Operation::ListUsers, ADMIN),
    (Operation::UpdateUserRole, ADMIN),
    (Operation::UpdateUserStatus, DESK),
    (Operation::DeleteUser, ADMIN),
    (Operation::ReadAuditLog, ADMIN),
    (Operation::ReadReports, CLINICAL),
    (Operation::ReadProfile, EVERYONE),
    (Operation::UpdateProfile, EVERYONE),
];

/// A Casbin enforcer
pub struct Enforcer(casbin::Enforcer);

type CasbinResult = Result<(), AccessDenied>;

/// Access refused, without details
#[derive(Debug, Error)]
#[error("You do not have permission to perform this action")]
pub struct AccessDenied;

/// An enforcer bound to the caller of one request.
pub struct Context<'ctx> {
    enforcer: &'ctx Enforcer,
    actor: &'ctx Actor,
}

impl Enforcer {
    pub async fn load() -> Result<Self, casbin::Error> {
        let model = DefaultModel::from_str(MODEL).await?;
        let mut enforcer = casbin::Enforcer::new(model, MemoryAdapter::default()).await?;

        let policies = ROLE_MATRIX
            .iter()
            .flat_map(|(operation, roles)| {
                let (object, action) = operation.policy();
                roles
                    .iter()
                    .map(move |role| vec![role.to_string(), object.to_string(), action.to_string()])
            })
            .collect();
        enforcer.add_policies(policies).await?;

        Ok(Enforcer(enforcer))
    }

    pub fn with_actor<'ctx>(&'ctx self, actor: &'ctx Actor) -> Context<'ctx> {
        Context {
            enforcer: self,
            actor,
        }
    }
}

impl Context<'_> {
    pub fn actor(&self) -> &Actor {
        self.actor
    }

    /// Role-table decision for the caller.
    pub fn authorize(&self, operation: Operation) -> CasbinResult {
        let (object, action) = operation.policy();
        let role = self.actor.role.as_ref();

        match self.enforcer.0.enforce((role, object, action)) {
            Err(e) => {
                error!("Casbin error: {e:?}");
                Err(AccessDenied)
            }
            Ok(granted) => {
                debug!("{} by {} ({role}): {granted}", operation, self.actor.id);
                if granted {
                    Ok(())
                } else {
                    Err(AccessDenied)
                }
            }
        }
    }

    /// Only the assigned doctor moves an appointment's status.
    pub fn owns_appointment(&self, appointment: &Appointment) -> CasbinResult {
        if appointment.assigned_to == self.actor.id {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }

    /// Whether the caller may see records of this patient. Accounts with the
    /// `user` role only see the patient linked to them.
    pub fn sees_patient(&self, patient: &Patient) -> bool {
        match self.actor.role {
            Role::User => patient.user == Some(self.actor.id),
            Role::Admin | Role::Staff | Role::Doctor => true,
        }
    }

    /// Doctors see the invoices they issued, users those of their own
    /// patient record.
    pub fn sees_invoice(&self, invoice: &Invoice) -> bool {
        match self.actor.role {
            Role::Admin | Role::Staff => true,
            Role::Doctor => invoice.issued_by == self.actor.id,
            Role::User => self.actor.patient == Some(invoice.patient),
        }
    }

    /// Status changes never target oneself, and staff leave admins alone.
    pub fn manage_user(&self, target: &User) -> CasbinResult {
        if target.id == self.actor.id {
            return Err(AccessDenied);
        }
        if self.actor.role == Role::Staff && target.role == Role::Admin {
            return Err(AccessDenied);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::*;
    use chrono::Utc;
    use strum::IntoEnumIterator;

    async fn set_enforcer() -> Enforcer {
        Enforcer::load().await.expect("Error in loading Enforcer")
    }

    fn actor(role: Role) -> Actor {
        Actor {
            id: UserId::new(),
            role,
            patient: None,
        }
    }

    /// Expected decisions, columns admin, staff, doctor, user.
    const EXPECTED: &[(Operation, [bool; 4])] = &[
        (Operation::ListPatients, [true, true, false, false]),
        (Operation::SearchPatients, [true, true, false, false]),
        (Operation::ReadPatient, [true, true, true, true]),
        (Operation::CreatePatient, [true, true, false, false]),
        (Operation::UpdatePatient, [true, true, false, false]),
        (Operation::DeletePatient, [true, true, false, false]),
        (Operation::ListAppointments, [true, true, false, false]),
        (Operation::CreateAppointment, [true, true, false, false]),
        (Operation::UpdateAppointment, [true, true, false, false]),
        (Operation::DeleteAppointment, [true, true, false, false]),
        (Operation::ReadPatientAppointments, [true, true, false, true]),
        (Operation::ReadAssignedAppointments, [false, true, true, false]),
        (Operation::UpdateAppointmentStatus, [false, false, true, false]),
        (Operation::ReadHistory, [true, true, true, true]),
        (Operation::CreateHistory, [true, true, true, false]),
        (Operation::UpdateHistory, [true, true, true, false]),
        (Operation::DeleteHistory, [true, true, false, false]),
        (Operation::ListInvoices, [true, true, true, true]),
        (Operation::ReadInvoice, [true, true, true, true]),
        (Operation::CreateInvoice, [false, false, true, false]),
        (Operation::PayInvoice, [true, true, false, false]),
        (Operation::ListUsers, [true, false, false, false]),
        (Operation::UpdateUserRole, [true, false, false, false]),
        (Operation::UpdateUserStatus, [true, true, false, false]),
        (Operation::DeleteUser, [true, false, false, false]),
        (Operation::ReadAuditLog, [true, false, false, false]),
        (Operation::ReadReports, [true, true, true, false]),
        (Operation::ReadProfile, [true, true, true, true]),
        (Operation::UpdateProfile, [true, true, true, true]),
    ];

    #[tokio::test]
    async fn every_role_and_operation_matches_the_matrix() {
        let enforcer = set_enforcer().await;
        let roles = [Role::Admin, Role::Staff, Role::Doctor, Role::User];

        assert_eq!(EXPECTED.len(), Operation::iter().count());

        for operation in Operation::iter() {
            let (_, expected) = EXPECTED
                .iter()
                .find(|(op, _)| *op == operation)
                .unwrap_or_else(|| panic!("No expectation for {operation}"));

            for (role, allowed) in roles.iter().zip(expected) {
                let actor = actor(*role);
                let decision = enforcer.with_actor(&actor).authorize(operation);
                assert_eq!(
                    decision.is_ok(),
                    *allowed,
                    "{operation} for {role}: expected allowed={allowed}"
                );
            }
        }
    }

    #[test]
    fn matrix_lists_every_operation_once() {
        for operation in Operation::iter() {
            let entries = ROLE_MATRIX.iter().filter(|(op, _)| *op == operation).count();
            assert_eq!(entries, 1, "{operation} appears {entries} times");
        }
    }

    #[tokio::test]
    async fn doctor_only_owns_assigned_appointments() {
        let enforcer = set_enforcer().await;
        let doctor = actor(Role::Doctor);
        let mut appointment = Appointment {
            id: AppointmentId::new(),
            date: Utc::now(),
            reason: "Checkup".to_string(),
            patient: PatientId::new(),
            assigned_to: doctor.id,
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
        };
        let context = enforcer.with_actor(&doctor);

        assert!(context.owns_appointment(&appointment).is_ok());
        appointment.assigned_to = UserId::new();
        assert!(context.owns_appointment(&appointment).is_err());
    }

    #[tokio::test]
    async fn invoice_visibility_follows_role() {
        let enforcer = set_enforcer().await;
        let doctor = actor(Role::Doctor);
        let mut user = actor(Role::User);
        let patient = PatientId::new();
        user.patient = Some(patient);

        let mut stranger = actor(Role::User);
        let invoice = Invoice {
            id: InvoiceId::new(),
            patient,
            medical_history: HistoryId::new(),
            issued_by: doctor.id,
            issued_to: Some(stranger.id),
            services: vec![],
            total_amount: 0.0,
            status: InvoiceStatus::Pending,
            created_at: Utc::now(),
            paid_at: None,
        };

        assert!(enforcer.with_actor(&doctor).sees_invoice(&invoice));
        assert!(enforcer.with_actor(&user).sees_invoice(&invoice));
        assert!(!enforcer.with_actor(&actor(Role::Doctor)).sees_invoice(&invoice));
        assert!(!enforcer.with_actor(&actor(Role::User)).sees_invoice(&invoice));
        assert!(enforcer.with_actor(&actor(Role::Staff)).sees_invoice(&invoice));

        // Being the recipient is not enough without the patient link
        assert!(!enforcer.with_actor(&stranger).sees_invoice(&invoice));
        stranger.patient = Some(PatientId::new());
        assert!(!enforcer.with_actor(&stranger).sees_invoice(&invoice));
    }
}
