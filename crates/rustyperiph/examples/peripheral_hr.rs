use rustyperiph::gap::{UUID_BAS, UUID_DIS, UUID_HRS};
use rustyperiph::{
    AdFlags, AdvHandle, AdvertisingElement, AdvertisingParameters, BatterySimulator, ConnHandle,
    Dispatcher, GattNotifier, HeartRateSimulator, KeyStore, MemoryBondStorage, PeerAddress,
    PeriodicNotifier, Radio, RadioError, SecurityLevel, ServiceSimulator, Session, SessionConfig,
    SessionObserver, StartRequest,
};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::thread;
use std::time::Duration;

/// Radio that only prints what it is asked to do
struct ConsoleRadio {
    contexts: u8,
}

impl Radio for ConsoleRadio {
    fn create_advertising_context(
        &mut self,
        _params: &AdvertisingParameters,
    ) -> Result<AdvHandle, RadioError> {
        let handle = AdvHandle(self.contexts);
        self.contexts += 1;
        Ok(handle)
    }

    fn start_advertising(
        &mut self,
        handle: AdvHandle,
        request: &StartRequest<'_>,
    ) -> Result<(), RadioError> {
        println!(
            "radio: start context {} ({}) data {}",
            handle.0,
            request.duty,
            hex::encode(request.payload)
        );
        Ok(())
    }

    fn update_payload(&mut self, handle: AdvHandle, payload: &[u8]) -> Result<(), RadioError> {
        println!("radio: update context {} data {}", handle.0, hex::encode(payload));
        Ok(())
    }

    fn stop_advertising(&mut self, handle: AdvHandle) {
        println!("radio: stop context {}", handle.0);
    }

    fn disconnect(&mut self, conn: ConnHandle, reason: u8) -> Result<(), RadioError> {
        println!("radio: disconnect {} reason 0x{:02x}", conn, reason);
        Ok(())
    }
}

struct ConsoleGatt;

impl GattNotifier for ConsoleGatt {
    fn notify(&mut self, service_id: u16, value: &[u8]) {
        println!("gatt: notify 0x{:04x} {}", service_id, hex::encode(value));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let identity: PeerAddress = "C0:11:22:33:44:55 (random)".parse()?;
    let keys = KeyStore::with_storage(Box::new(MemoryBondStorage::new()))?;
    let config = SessionConfig::default().with_device_name("Rusty HR");

    let session = Session::new(ConsoleRadio { contexts: 0 }, identity, keys, config);
    let (mut dispatcher, link_layer) = Dispatcher::new(session);

    let set = dispatcher.create_set(
        AdvertisingParameters::connectable().with_name(),
        vec![
            AdvertisingElement::flags(AdFlags::LE_GENERAL | AdFlags::NO_BREDR),
            AdvertisingElement::uuid16_all(&[UUID_HRS, UUID_BAS, UUID_DIS]),
        ],
    )?;
    dispatcher.start_set(set)?;

    let simulators: Vec<Box<dyn ServiceSimulator>> = vec![
        Box::new(HeartRateSimulator::new()),
        Box::new(BatterySimulator::new()),
    ];
    let notifier = PeriodicNotifier::spawn(Duration::from_secs(1), ConsoleGatt, simulators);

    // A central connects, pairs twice and leaves
    let central = thread::spawn(move || {
        let peer = PeerAddress::random([0xE2, 0x4E, 0x39, 0x95, 0xC1, 0xC9]);
        let conn = ConnHandle(0x0040);

        thread::sleep(Duration::from_millis(500));
        link_layer.link_connected(AdvHandle(0), conn, peer, 0);
        thread::sleep(Duration::from_millis(200));
        link_layer.security_changed(conn, SecurityLevel::EncryptionOnly, None);
        link_layer.security_changed(conn, SecurityLevel::EncryptionWithAuthentication, None);
        thread::sleep(Duration::from_secs(2));
        link_layer.link_disconnected(conn, 0x13);
    });

    dispatcher.run(|outcome| println!("session: {:?}", outcome))?;
    central.join().map_err(|_| "central thread panicked")?;
    drop(notifier);

    Ok(())
}
