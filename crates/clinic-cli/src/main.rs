use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clinic_core::import::ImportAction;
use clinic_core::labs::LabRequest;
use clinic_core::models::{DraftLine, PurchaseLine, Urgency};
use clinic_core::{
    BookingRequest, ClinicConfig, ClinicCore, Discount, Doctor, Expense, LabStatus, Patient,
    Payment, PrescriptionItem, ReferralLetter, SaleDraft, StockMode, Supplier, Verification,
};

#[derive(Parser)]
#[command(name = "clinic")]
#[command(author, version, about = "Clinic and pharmacy front desk", long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides storage.data_dir from the config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Patient(PatientCommand),
    #[command(subcommand)]
    Doctor(DoctorCommand),
    #[command(subcommand)]
    Appointment(AppointmentCommand),
    #[command(subcommand)]
    Prescription(PrescriptionCommand),
    #[command(subcommand)]
    Lab(LabCommand),
    #[command(subcommand)]
    Supplier(SupplierCommand),
    #[command(subcommand)]
    Purchase(PurchaseCommand),
    #[command(subcommand)]
    Inventory(InventoryCommand),
    #[command(subcommand)]
    Import(ImportCommand),
    #[command(subcommand)]
    Expense(ExpenseCommand),
    #[command(subcommand)]
    Sale(SaleCommand),
    #[command(subcommand)]
    Referral(ReferralCommand),
    #[command(subcommand)]
    Ledger(LedgerCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum PatientCommand {
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// YYYY-MM-DD
        #[arg(long)]
        born: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long = "allergy")]
        allergies: Vec<String>,
    },
    List,
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum DoctorCommand {
    Add {
        name: String,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    List {
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum AppointmentCommand {
    Book {
        patient_id: String,
        doctor_id: String,
        /// YYYY-MM-DDTHH:MM
        start: String,
        #[arg(long, default_value = "30")]
        minutes: i64,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Free slots of a doctor on a day
    Slots {
        doctor_id: String,
        date: String,
    },
    /// Nearest free slot to a preferred time
    Nearest {
        doctor_id: String,
        preferred: String,
        #[arg(long, default_value = "120")]
        flex: i64,
    },
    Cancel {
        id: String,
    },
    Complete {
        id: String,
    },
    NoShow {
        id: String,
    },
    Delete {
        id: String,
    },
    List {
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
    },
}

#[derive(Subcommand)]
enum PrescriptionCommand {
    Add {
        patient_id: String,
        doctor_id: String,
        /// NAME:QTY[:ITEM_ID], repeatable
        #[arg(long = "drug", required = true)]
        drugs: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Show {
        id: String,
    },
    /// Print as HTML
    Print {
        id: String,
    },
    /// Open a sale for the stocked lines
    Dispense {
        id: String,
        #[arg(long)]
        currency: Option<String>,
        /// User acting on the prescription, needed while it is being edited
        #[arg(long)]
        by: Option<String>,
    },
    Cancel {
        id: String,
        #[arg(long)]
        by: Option<String>,
    },
    Delete {
        id: String,
        #[arg(long)]
        by: Option<String>,
    },
}

#[derive(Subcommand)]
enum LabCommand {
    Order {
        patient_id: String,
        test_name: String,
        #[arg(long)]
        doctor: Option<String>,
        #[arg(long)]
        lab: Option<String>,
        #[arg(long, default_value = "0")]
        price: f64,
    },
    /// ordered, sample_collected, completed or cancelled
    Advance {
        id: String,
        status: String,
        #[arg(long)]
        result: Option<String>,
    },
    Attach {
        id: String,
        file: PathBuf,
        #[arg(long, default_value = "application/pdf")]
        content_type: String,
    },
    List {
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum SupplierCommand {
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Change contact details; omitted fields are kept
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    List,
    Balance {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
enum PurchaseCommand {
    Create {
        supplier_id: String,
        #[arg(long)]
        currency: Option<String>,
        /// ITEM_ID:QTY:UNIT_COST, repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
    },
    Receive {
        id: String,
    },
    Cancel {
        id: String,
    },
    Pay {
        id: String,
        amount: f64,
    },
}

#[derive(Subcommand)]
enum InventoryCommand {
    List {
        #[arg(long)]
        all: bool,
    },
    Search {
        query: String,
    },
    LowStock,
    Expiring {
        #[arg(long, default_value = "90")]
        days: i64,
    },
    Adjust {
        id: String,
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },
}

#[derive(Subcommand)]
enum ImportCommand {
    /// Import drugs from a CSV export; dry run unless --apply
    Drugs {
        file: PathBuf,
        #[arg(long)]
        apply: bool,
        /// Set stock to the imported quantity instead of adding it
        #[arg(long)]
        replace_stock: bool,
    },
}

#[derive(Subcommand)]
enum ExpenseCommand {
    Add {
        category: String,
        amount: f64,
        #[arg(long)]
        currency: Option<String>,
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        paid_to: Option<String>,
        /// Scanned receipt to attach
        #[arg(long)]
        receipt: Option<PathBuf>,
    },
    Summary {
        from: String,
        to: String,
    },
    Export {
        from: String,
        to: String,
    },
}

#[derive(Subcommand)]
enum SaleCommand {
    /// Create a quotation
    Quote {
        /// ITEM_ID:QTY[:DISCOUNT%], repeatable
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        /// Percent discount on the whole sale
        #[arg(long)]
        discount: Option<f64>,
    },
    /// Open a sale
    Create {
        #[arg(long = "line", required = true)]
        lines: Vec<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        patient: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        discount: Option<f64>,
    },
    /// Turn a quotation into an open sale
    Convert {
        quotation_id: String,
    },
    Pay {
        id: String,
        amount: f64,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long, default_value = "cash")]
        method: String,
    },
    Complete {
        id: String,
        /// Allow completion with an unpaid balance
        #[arg(long)]
        credit: bool,
    },
    Void {
        id: String,
        reason: String,
    },
    Receipt {
        id: String,
        #[arg(long)]
        html: bool,
    },
    Report {
        from: String,
        to: String,
        #[arg(long)]
        csv: bool,
    },
}

#[derive(Subcommand)]
enum ReferralCommand {
    Create {
        patient_id: String,
        doctor_id: String,
        referred_to: String,
        reason: String,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        urgent: bool,
    },
    Print {
        id: String,
        #[arg(long)]
        html: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// Recompute the hash chain of completed sales
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => ClinicConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClinicConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    if let Commands::Config(ConfigCommand::Show) = cli.command {
        return print_json(&config);
    }

    let core = ClinicCore::open(config)?;
    run(&core, cli.command)
}

fn run(core: &ClinicCore, command: Commands) -> Result<()> {
    match command {
        Commands::Patient(cmd) => patient(core, cmd),
        Commands::Doctor(cmd) => doctor(core, cmd),
        Commands::Appointment(cmd) => appointment(core, cmd),
        Commands::Prescription(cmd) => prescription(core, cmd),
        Commands::Lab(cmd) => lab(core, cmd),
        Commands::Supplier(cmd) => supplier(core, cmd),
        Commands::Purchase(cmd) => purchase(core, cmd),
        Commands::Inventory(cmd) => inventory(core, cmd),
        Commands::Import(cmd) => import(core, cmd),
        Commands::Expense(cmd) => expense(core, cmd),
        Commands::Sale(cmd) => sale(core, cmd),
        Commands::Referral(cmd) => referral(core, cmd),
        Commands::Ledger(LedgerCommand::Verify) => match core.verify_ledger()? {
            Verification::Intact { entries, head } => {
                println!("Ledger intact: {} entries", entries);
                if let Some(head) = head {
                    println!("Head: {}", head);
                }
                Ok(())
            }
            Verification::Broken { seq, reason } => {
                bail!("ledger broken at entry {}: {}", seq, reason)
            }
        },
        Commands::Config(ConfigCommand::Show) => print_json(core.config()),
    }
}

fn patient(core: &ClinicCore, cmd: PatientCommand) -> Result<()> {
    match cmd {
        PatientCommand::Add {
            name,
            phone,
            email,
            born,
            gender,
            allergies,
        } => {
            let mut patient = Patient::new(name);
            patient.phone = phone;
            patient.email = email;
            patient.date_of_birth = born.as_deref().map(parse_date).transpose()?;
            patient.gender = gender;
            patient.allergies = allergies;
            print_json(&core.create_patient(patient)?)
        }
        PatientCommand::List => print_json(&core.list_patients()?),
        PatientCommand::Search { query, limit } => {
            print_json(&core.search_patients(&query, limit)?)
        }
        PatientCommand::Show { id } => print_json(&core.get_patient(&id)?),
        PatientCommand::Delete { id } => {
            core.delete_patient(&id)?;
            info!("Deleted patient {}", id);
            Ok(())
        }
    }
}

fn doctor(core: &ClinicCore, cmd: DoctorCommand) -> Result<()> {
    match cmd {
        DoctorCommand::Add {
            name,
            specialty,
            phone,
        } => {
            let mut doctor = Doctor::new(name);
            doctor.specialty = specialty;
            doctor.phone = phone;
            print_json(&core.add_doctor(doctor)?)
        }
        DoctorCommand::List { all } => print_json(&core.list_doctors(!all)?),
    }
}

fn appointment(core: &ClinicCore, cmd: AppointmentCommand) -> Result<()> {
    match cmd {
        AppointmentCommand::Book {
            patient_id,
            doctor_id,
            start,
            minutes,
            reason,
        } => {
            let start = parse_datetime(&start)?;
            let request = BookingRequest {
                patient_id,
                doctor_id,
                start,
                end: start + chrono::Duration::minutes(minutes),
                reason,
            };
            print_json(&core.book_appointment(request)?)
        }
        AppointmentCommand::Slots { doctor_id, date } => {
            let slots = core.available_slots(&doctor_id, parse_date(&date)?)?;
            for slot in &slots {
                println!("{} - {}", slot.start.format("%H:%M"), slot.end.format("%H:%M"));
            }
            info!("{} free slots", slots.len());
            Ok(())
        }
        AppointmentCommand::Nearest {
            doctor_id,
            preferred,
            flex,
        } => match core.find_nearest_slot(&doctor_id, parse_datetime(&preferred)?, flex)? {
            Some(slot) => {
                println!("{} - {}", slot.start.format("%Y-%m-%d %H:%M"), slot.end.format("%H:%M"));
                Ok(())
            }
            None => bail!("no free slot within {} minutes", flex),
        },
        AppointmentCommand::Cancel { id } => print_json(&core.cancel_appointment(&id)?),
        AppointmentCommand::Complete { id } => print_json(&core.complete_appointment(&id)?),
        AppointmentCommand::NoShow { id } => print_json(&core.mark_no_show(&id)?),
        AppointmentCommand::Delete { id } => {
            core.delete_appointment(&id)?;
            info!("Deleted appointment {}", id);
            Ok(())
        }
        AppointmentCommand::List { date } => {
            let date = match date {
                Some(date) => parse_date(&date)?,
                None => Local::now().date_naive(),
            };
            print_json(&core.appointments_on(date, None)?)
        }
    }
}

fn prescription(core: &ClinicCore, cmd: PrescriptionCommand) -> Result<()> {
    match cmd {
        PrescriptionCommand::Add {
            patient_id,
            doctor_id,
            drugs,
            notes,
        } => {
            let items = drugs
                .iter()
                .map(|spec| parse_drug(spec))
                .collect::<Result<Vec<_>>>()?;
            print_json(&core.create_prescription(&patient_id, &doctor_id, items, notes)?)
        }
        PrescriptionCommand::Show { id } => print_json(&core.get_prescription(&id)?),
        PrescriptionCommand::Print { id } => {
            print!("{}", core.prescription_html(&id)?);
            Ok(())
        }
        PrescriptionCommand::Dispense { id, currency, by } => print_json(
            &core.dispense_prescription(&id, currency.as_deref(), by.as_deref())?,
        ),
        PrescriptionCommand::Cancel { id, by } => {
            print_json(&core.cancel_prescription(&id, by.as_deref())?)
        }
        PrescriptionCommand::Delete { id, by } => {
            core.delete_prescription(&id, by.as_deref())?;
            info!("Deleted prescription {}", id);
            Ok(())
        }
    }
}

fn lab(core: &ClinicCore, cmd: LabCommand) -> Result<()> {
    match cmd {
        LabCommand::Order {
            patient_id,
            test_name,
            doctor,
            lab,
            price,
        } => {
            let request = LabRequest {
                patient_id,
                doctor_id: doctor,
                test_name,
                lab_name: lab,
                price,
            };
            print_json(&core.order_lab(request)?)
        }
        LabCommand::Advance { id, status, result } => {
            print_json(&core.advance_lab(&id, parse_lab_status(&status)?, result)?)
        }
        LabCommand::Attach {
            id,
            file,
            content_type,
        } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            print_json(&core.attach_lab_result(&id, &bytes, &content_type)?)
        }
        LabCommand::List { patient, status } => {
            let status = status.as_deref().map(parse_lab_status).transpose()?;
            print_json(&core.lab_orders(patient.as_deref(), status)?)
        }
        LabCommand::Delete { id } => {
            core.delete_lab_order(&id)?;
            info!("Deleted lab order {}", id);
            Ok(())
        }
    }
}

fn supplier(core: &ClinicCore, cmd: SupplierCommand) -> Result<()> {
    match cmd {
        SupplierCommand::Add { name, phone, email } => {
            let mut supplier = Supplier::new(name);
            supplier.phone = phone;
            supplier.email = email;
            print_json(&core.add_supplier(supplier)?)
        }
        SupplierCommand::Update {
            id,
            name,
            phone,
            email,
        } => {
            let mut supplier = core.get_supplier(&id)?;
            if let Some(name) = name {
                supplier.name = name;
            }
            if phone.is_some() {
                supplier.phone = phone;
            }
            if email.is_some() {
                supplier.email = email;
            }
            print_json(&core.update_supplier(supplier)?)
        }
        SupplierCommand::List => print_json(&core.list_suppliers()?),
        SupplierCommand::Balance { id } => print_json(&core.supplier_balance(&id)?),
        SupplierCommand::Delete { id } => {
            core.delete_supplier(&id)?;
            info!("Deleted supplier {}", id);
            Ok(())
        }
    }
}

fn purchase(core: &ClinicCore, cmd: PurchaseCommand) -> Result<()> {
    match cmd {
        PurchaseCommand::Create {
            supplier_id,
            currency,
            lines,
        } => {
            let currency = currency.unwrap_or_else(|| core.rates().base.clone());
            let lines = lines
                .iter()
                .map(|spec| parse_purchase_line(spec))
                .collect::<Result<Vec<_>>>()?;
            print_json(&core.create_purchase_order(&supplier_id, &currency, lines)?)
        }
        PurchaseCommand::Receive { id } => print_json(&core.receive_purchase_order(&id)?),
        PurchaseCommand::Cancel { id } => print_json(&core.cancel_purchase_order(&id)?),
        PurchaseCommand::Pay { id, amount } => {
            print_json(&core.record_supplier_payment(&id, amount)?)
        }
    }
}

fn inventory(core: &ClinicCore, cmd: InventoryCommand) -> Result<()> {
    match cmd {
        InventoryCommand::List { all } => print_json(&core.list_inventory(!all)?),
        InventoryCommand::Search { query } => print_json(&core.search_inventory(&query, 50)?),
        InventoryCommand::LowStock => print_json(&core.low_stock_items()?),
        InventoryCommand::Expiring { days } => {
            print_json(&core.expiring_items(Local::now().date_naive(), days)?)
        }
        InventoryCommand::Adjust { id, delta } => {
            let stock = core.adjust_stock(&id, delta)?;
            println!("{}", stock);
            Ok(())
        }
    }
}

fn import(core: &ClinicCore, cmd: ImportCommand) -> Result<()> {
    let ImportCommand::Drugs {
        file,
        apply,
        replace_stock,
    } = cmd;
    let text =
        std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
    let mode = if replace_stock {
        StockMode::Replace
    } else {
        StockMode::Add
    };

    let plan = core.plan_drug_import(&text, mode)?;
    for planned in plan.fuzzy_rows() {
        if let ImportAction::Update {
            matched_name, score, ..
        } = &planned.action
        {
            println!(
                "line {}: {:?} ~ {:?} ({:.2})",
                planned.row.line, planned.row.name, matched_name, score
            );
        }
    }
    for error in &plan.errors {
        println!("line {}: {}", error.line, error.message);
    }
    if !plan.ignored_columns.is_empty() {
        println!("Ignored columns: {}", plan.ignored_columns.join(", "));
    }

    let summary = if apply {
        core.apply_drug_import(&plan, mode)?
    } else {
        info!("Dry run; pass --apply to write");
        plan.summary()
    };
    print_json(&summary)
}

fn expense(core: &ClinicCore, cmd: ExpenseCommand) -> Result<()> {
    match cmd {
        ExpenseCommand::Add {
            category,
            amount,
            currency,
            date,
            description,
            paid_to,
            receipt,
        } => {
            let date = match date {
                Some(date) => parse_date(&date)?,
                None => Local::now().date_naive(),
            };
            let currency = currency.unwrap_or_else(|| core.rates().base.clone());
            let mut expense = Expense::new(category, amount, currency, date);
            expense.description = description;
            expense.paid_to = paid_to;
            let mut expense = core.record_expense(expense)?;
            if let Some(path) = receipt {
                let bytes =
                    std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                expense = core.attach_expense_receipt(&expense.id, &bytes, content_type_of(&path))?;
            }
            print_json(&expense)
        }
        ExpenseCommand::Summary { from, to } => {
            print_json(&core.expense_summary(parse_date(&from)?, parse_date(&to)?)?)
        }
        ExpenseCommand::Export { from, to } => {
            print!("{}", core.expenses_csv(parse_date(&from)?, parse_date(&to)?)?);
            Ok(())
        }
    }
}

fn sale(core: &ClinicCore, cmd: SaleCommand) -> Result<()> {
    match cmd {
        SaleCommand::Quote {
            lines,
            currency,
            patient,
            customer,
            discount,
        } => {
            let draft = sale_draft(core, lines, currency, patient, customer, discount)?;
            print_json(&core.create_quotation(&draft)?)
        }
        SaleCommand::Create {
            lines,
            currency,
            patient,
            customer,
            discount,
        } => {
            let draft = sale_draft(core, lines, currency, patient, customer, discount)?;
            print_json(&core.open_sale(&draft)?)
        }
        SaleCommand::Convert { quotation_id } => print_json(&core.convert_quotation(&quotation_id)?),
        SaleCommand::Pay {
            id,
            amount,
            currency,
            method,
        } => {
            let currency = match currency {
                Some(currency) => currency,
                None => core.get_sale(&id)?.currency,
            };
            let mut payment = Payment::cash(amount, &currency);
            payment.method = method;
            print_json(&core.add_payment(&id, payment)?)
        }
        SaleCommand::Complete { id, credit } => {
            let sale = core.complete_sale(&id, credit)?;
            print!("{}", core.receipt_text(&sale.id)?);
            Ok(())
        }
        SaleCommand::Void { id, reason } => print_json(&core.void_sale(&id, &reason)?),
        SaleCommand::Receipt { id, html } => {
            let id = match id.parse::<i64>() {
                Ok(number) => core.get_sale_by_receipt(number)?.id,
                Err(_) => id,
            };
            if html {
                print!("{}", core.receipt_html(&id)?);
            } else {
                print!("{}", core.receipt_text(&id)?);
            }
            Ok(())
        }
        SaleCommand::Report { from, to, csv } => {
            let (from, to) = (parse_date(&from)?, parse_date(&to)?);
            if csv {
                print!("{}", core.sales_csv(from, to)?);
                Ok(())
            } else {
                let mut report = core.sales_report(from, to)?;
                report.sales.clear();
                print_json(&report)
            }
        }
    }
}

fn referral(core: &ClinicCore, cmd: ReferralCommand) -> Result<()> {
    match cmd {
        ReferralCommand::Create {
            patient_id,
            doctor_id,
            referred_to,
            reason,
            specialty,
            summary,
            urgent,
        } => {
            let mut letter = ReferralLetter::new(patient_id, doctor_id, referred_to, reason);
            letter.specialty = specialty;
            letter.clinical_summary = summary;
            if urgent {
                letter.urgency = Urgency::Urgent;
            }
            print_json(&core.create_referral(letter)?)
        }
        ReferralCommand::Print { id, html } => {
            if html {
                print!("{}", core.referral_html(&id)?);
            } else {
                print!("{}", core.referral_text(&id)?);
            }
            Ok(())
        }
    }
}

fn sale_draft(
    core: &ClinicCore,
    lines: Vec<String>,
    currency: Option<String>,
    patient: Option<String>,
    customer: Option<String>,
    discount: Option<f64>,
) -> Result<SaleDraft> {
    let currency = currency.unwrap_or_else(|| core.rates().base.clone());
    let mut draft = SaleDraft::new(&currency);
    draft.patient_id = patient;
    draft.customer_name = customer;
    draft.discount = discount.map(Discount::Percent).unwrap_or_default();
    draft.lines = lines
        .iter()
        .map(|spec| parse_sale_line(spec))
        .collect::<Result<Vec<_>>>()?;
    Ok(draft)
}

// =========================================================================
// Argument parsing
// =========================================================================

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date {:?}, expected YYYY-MM-DD", value))
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .with_context(|| format!("invalid time {:?}, expected YYYY-MM-DDTHH:MM", value))
}

fn parse_lab_status(value: &str) -> Result<LabStatus> {
    LabStatus::parse(value).ok_or_else(|| anyhow!("unknown lab status {:?}", value))
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .with_context(|| format!("invalid {} {:?}", field, value))
}

/// `NAME:QTY[:ITEM_ID]`
fn parse_drug(spec: &str) -> Result<PrescriptionItem> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        bail!("invalid drug {:?}, expected NAME:QTY[:ITEM_ID]", spec);
    }
    let mut item = PrescriptionItem::new(parts[0].trim().to_string(), parse_number("quantity", parts[1])?);
    item.item_id = parts.get(2).map(|id| id.trim().to_string());
    Ok(item)
}

/// `ITEM_ID:QTY[:DISCOUNT%]`
fn parse_sale_line(spec: &str) -> Result<DraftLine> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        bail!("invalid line {:?}, expected ITEM_ID:QTY[:DISCOUNT%]", spec);
    }
    Ok(DraftLine {
        item_id: parts[0].trim().to_string(),
        quantity: parse_number("quantity", parts[1])?,
        discount_percent: match parts.get(2) {
            Some(discount) => parse_number("discount", discount)?,
            None => 0.0,
        },
    })
}

/// `ITEM_ID:QTY:UNIT_COST`
fn parse_purchase_line(spec: &str) -> Result<PurchaseLine> {
    match spec.split(':').collect::<Vec<_>>().as_slice() {
        [item_id, quantity, unit_cost] => Ok(PurchaseLine {
            item_id: item_id.trim().to_string(),
            quantity: parse_number("quantity", quantity)?,
            unit_cost: parse_number("unit cost", unit_cost)?,
        }),
        _ => bail!("invalid line {:?}, expected ITEM_ID:QTY:UNIT_COST", spec),
    }
}

fn content_type_of(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let line = parse_sale_line("abc:2:10").unwrap();
        assert_eq!(line.item_id, "abc");
        assert_eq!(line.quantity, 2.0);
        assert_eq!(line.discount_percent, 10.0);
        assert!(parse_sale_line("abc").is_err());

        let drug = parse_drug("Amoxicillin 500mg:21").unwrap();
        assert_eq!(drug.drug_name, "Amoxicillin 500mg");
        assert!(drug.item_id.is_none());

        let purchase = parse_purchase_line("x:100:0.25").unwrap();
        assert_eq!(purchase.unit_cost, 0.25);
        assert!(parse_purchase_line("x:100").is_err());
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-03-04T09:30").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-04 09:30").unwrap(), expected);
        assert!(parse_datetime("tomorrow").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "clinic",
            "--data-dir",
            "/tmp/x",
            "sale",
            "create",
            "--line",
            "a:1",
            "--line",
            "b:2",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Sale(SaleCommand::Create { .. })));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_prescription_commands_take_acting_user() {
        let cli =
            Cli::try_parse_from(["clinic", "prescription", "cancel", "rx1", "--by", "alice"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Prescription(PrescriptionCommand::Cancel { by: Some(ref by), .. }) if by == "alice"
        ));

        let cli = Cli::try_parse_from(["clinic", "prescription", "delete", "rx1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Prescription(PrescriptionCommand::Delete { by: None, .. })
        ));
    }
}
