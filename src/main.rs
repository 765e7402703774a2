//! flocksquawk: portable surveillance hardware detector firmware.
//!
//! Sniffs WiFi management frames across channels 1-13 and runs periodic
//! BLE scan cycles, feeds every sighting through the shared detector, and
//! streams detections, heartbeats and out-of-range notices as NDJSON over
//! serial and BLE GATT notifications (Nordic UART layout).

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use flocksquawk::board::{self, TestButton};
use flocksquawk::comm::{self, LineReader, NotificationSink};
use flocksquawk::defaults;
use flocksquawk::detector::{DetectorConfig, SharedDetector};
use flocksquawk::protocol::{DeviceMessage, HostCommand, MsgBuffer, VERSION};
use flocksquawk::scanner::{self, BleAdvParser, BleScanScheduler, ChannelHopper, Observation};

// ── BLE GATT server definition ──────────────────────────────────────
//
// Service UUID must match comm::UART_SERVICE_UUID, which is advertised.

#[gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
struct UartService {
    /// RX: host command writes, accumulated with LineReader
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write)]
    rx: [u8; 20],

    /// TX: NDJSON notifications in BLE_MAX_NOTIFY chunks. The companion
    /// accumulates until it sees '\n'.
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    tx: [u8; 20],
}

#[gatt_server]
struct DetectorServer {
    uart: UartService,
}

// ── Channel type aliases ──────────────────────────────────────────────

type ScanChannel = Channel<CriticalSectionRawMutex, Observation, 16>;
type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 8>;
type BleOutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 4>;
type CommandChannel = Channel<CriticalSectionRawMutex, HostCommand, 4>;

// ── Static channels and shared state ─────────────────────────────────

/// Observations from the WiFi sniffer callback and the BLE scan handler
static SCAN_CHANNEL: ScanChannel = Channel::new();

/// Serialized NDJSON lines for serial and BLE output
static OUTPUT_CHANNEL: OutputChannel = Channel::new();

/// Copies of output lines for the GATT server to notify
static BLE_OUTPUT_CHANNEL: BleOutputChannel = Channel::new();

static CMD_CHANNEL: CommandChannel = Channel::new();

/// Debounce cache, session lifecycle and counters
static DETECTOR: SharedDetector = SharedDetector::new(DetectorConfig::new());

/// Toggled by host start/stop commands
static SCANNING: AtomicBool = AtomicBool::new(true);

/// Channel the sniffer is currently tuned to
static CURRENT_CHANNEL: AtomicU8 = AtomicU8::new(1);

static BLE_CLIENTS: AtomicU8 = AtomicU8::new(0);

/// Poll period for heartbeat, timeout, channel hop and test button
const POLL_INTERVAL_MS: u64 = 100;

/// Periodic status snapshot interval
const STATUS_INTERVAL_SECS: u64 = 30;

const ADVERTISE_RETRY_SECS: u64 = 5;

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

/// Queues serialized lines on the output channel. Drops when full.
struct OutputSink;

impl NotificationSink for OutputSink {
    fn send_line(&mut self, line: &[u8]) -> bool {
        let Ok(buf) = MsgBuffer::from_slice(line) else {
            return false;
        };
        let sent = OUTPUT_CHANNEL.try_send(buf).is_ok();
        if !sent {
            log::warn!("output channel full, message dropped");
        }
        sent
    }
}

fn send_status() {
    let status = DETECTOR.with(|d| {
        d.status(
            now_ms(),
            CURRENT_CHANNEL.load(Ordering::Relaxed),
            SCANNING.load(Ordering::Relaxed),
        )
    });
    OutputSink.send(&DeviceMessage::Status(&status));
}

// ── WiFi sniffer ─────────────────────────────────────────────────────

/// Called from the WiFi driver's receive context. Parses the frame and
/// hands it off without blocking.
fn wifi_sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    if !SCANNING.load(Ordering::Relaxed) {
        return;
    }
    let rssi = pkt.rx_cntl.rssi as i32;
    let channel = pkt.rx_cntl.channel as u8;
    if let Some(obs) = scanner::parse_wifi_frame(pkt.data, rssi, channel) {
        let _ = SCAN_CHANNEL.try_send(obs);
    }
}

// Linked via esp-radio's WiFi driver.
unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
}

// ── BLE scan event handler ───────────────────────────────────────────

/// Receives advertisement reports from the trouble-host runner. Must not
/// block.
struct ScanEventHandler;

impl EventHandler for ScanEventHandler {
    fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = it.next() {
            let Ok(addr) = <[u8; 6]>::try_from(report.addr.raw()) else {
                continue;
            };
            let adv = BleAdvParser::parse(&addr, report.rssi as i32, report.data);
            let _ = SCAN_CHANNEL.try_send(adv.into_observation());
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Heap for the BLE + WiFi coex stacks
    #[cfg(feature = "esp32")]
    {
        esp_alloc::heap_allocator!(size: 64 * 1024);
    }
    #[cfg(not(feature = "esp32"))]
    {
        esp_alloc::heap_allocator!(size: 128 * 1024);
    }

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("flocksquawk v{} starting on {}", VERSION, board::BOARD_NAME);
    log::info!(
        "Signatures loaded: {} OUI prefixes, {} keywords, {} Raven services",
        defaults::oui_prefix_count(),
        defaults::keyword_count(),
        defaults::RAVEN_SERVICES.len(),
    );

    let button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    log::info!(
        "Test button on GPIO{} (press to simulate an Axon detection)",
        board::TEST_BUTTON_PIN
    );

    spawner.spawn(detection_task()).unwrap();
    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(status_task()).unwrap();
    spawner.spawn(command_task()).unwrap();

    // ── BLE radio initialization ───────────────────────────────────────
    // BLE must be initialized before WiFi for coexistence (ESP32-S3).

    let connector =
        esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
            .expect("BLE connector init failed");

    // ── WiFi sniffer initialization ─────────────────────────────────────

    let (_wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");

    let mut sniffer = wifi_interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);
    sniffer
        .set_promiscuous_mode(true)
        .expect("Promiscuous mode failed");

    log::info!("WiFi sniffer started in promiscuous mode");

    // Channel hopping needs the WiFi driver running
    spawner.spawn(poll_task(button)).unwrap();

    let controller: ExternalController<_, 20> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());

    let address = Address::random([0xff, 0x8f, 0x1a, 0x05, 0xe4, 0xab]);

    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        mut peripheral,
        central,
        mut runner,
        ..
    } = stack.build();

    let server = DetectorServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
        name: comm::BLE_ADV_NAME,
        appearance: &appearance::UNKNOWN,
    }))
    .expect("GATT server init failed");

    let scan_handler = ScanEventHandler;

    let payloads = match AdvPayloads::encode() {
        Some(p) => p,
        None => {
            log::error!("advertising payload does not fit, GATT server disabled");
            AdvPayloads::EMPTY
        }
    };

    // The host runner delivers scan reports to `scan_handler`; scan cycles
    // and the GATT server share it.
    let _ = embassy_futures::join::join3(
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        async {
            let mut ble_scanner = trouble_host::scan::Scanner::new(central);
            let config = ScanConfig::default();
            let mut schedule = BleScanScheduler::default();

            loop {
                if SCANNING.load(Ordering::Relaxed) && schedule.try_start(now_ms()) {
                    match ble_scanner.scan(&config).await {
                        Ok(session) => {
                            log::debug!("BLE scan cycle");
                            Timer::after(Duration::from_millis(scanner::BLE_SCAN_DURATION_MS))
                                .await;
                            drop(session);
                        }
                        Err(e) => log::error!("BLE scan failed to start: {:?}", e),
                    }
                    schedule.finish();
                }
                Timer::after(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        },
        async {
            if payloads.is_empty() {
                return;
            }
            log::info!(
                "BLE advertising as '{}' (service {})",
                comm::BLE_ADV_NAME,
                comm::UART_SERVICE_UUID
            );
            loop {
                let accepted = match peripheral
                    .advertise(&Default::default(), payloads.advertisement())
                    .await
                {
                    Ok(advertiser) => advertiser.accept().await,
                    Err(e) => {
                        log::error!("BLE advertise error: {:?}", e);
                        Timer::after(Duration::from_secs(ADVERTISE_RETRY_SECS)).await;
                        continue;
                    }
                };
                match accepted.and_then(|conn| conn.with_attribute_server(&server)) {
                    Ok(gatt_conn) => serve_client(&gatt_conn, &server).await,
                    Err(e) => log::error!("BLE connection setup failed: {:?}", e),
                }
            }
        },
    )
    .await;
}

/// Advertising data and scan response, encoded once at startup. The name
/// and the 128-bit service UUID do not fit in one 31-byte payload together.
struct AdvPayloads {
    adv: [u8; 31],
    adv_len: usize,
    scan: [u8; 31],
    scan_len: usize,
}

impl AdvPayloads {
    const EMPTY: Self = Self {
        adv: [0; 31],
        adv_len: 0,
        scan: [0; 31],
        scan_len: 0,
    };

    fn encode() -> Option<Self> {
        let service = comm::uuid128_le(comm::UART_SERVICE_UUID)?;
        let mut p = Self::EMPTY;
        p.adv_len = AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::CompleteLocalName(comm::BLE_ADV_NAME.as_bytes()),
            ],
            &mut p.adv[..],
        )
        .ok()?;
        p.scan_len =
            AdStructure::encode_slice(&[AdStructure::ServiceUuids128(&[service])], &mut p.scan[..])
                .ok()?;
        Some(p)
    }

    fn is_empty(&self) -> bool {
        self.adv_len == 0
    }

    fn advertisement(&self) -> Advertisement<'_> {
        Advertisement::ConnectableScannableUndirected {
            adv_data: &self.adv[..self.adv_len],
            scan_data: &self.scan[..self.scan_len],
        }
    }
}

/// Serve one connected client: forward output lines as chunked
/// notifications and collect command writes until it disconnects.
async fn serve_client<'s, P: PacketPool>(
    conn: &GattConnection<'_, 's, P>,
    server: &'s DetectorServer<'_>,
) {
    let clients = BLE_CLIENTS.fetch_add(1, Ordering::Relaxed) + 1;
    log::info!("BLE client connected ({} active)", clients);

    let ble_rx = BLE_OUTPUT_CHANNEL.receiver();
    let mut line_reader = LineReader::new();

    'session: loop {
        match embassy_futures::select::select(ble_rx.receive(), conn.next()).await {
            embassy_futures::select::Either::First(line) => {
                for chunk in comm::notify_chunks(&line) {
                    if server.uart.tx.notify(conn, &chunk).await.is_err() {
                        break 'session;
                    }
                    Timer::after(Duration::from_millis(comm::BLE_CHUNK_DELAY_MS)).await;
                }
            }
            embassy_futures::select::Either::Second(GattConnectionEvent::Disconnected {
                ..
            }) => break,
            embassy_futures::select::Either::Second(GattConnectionEvent::Gatt { event }) => {
                if let GattEvent::Write(ref write) = event {
                    if write.handle() == server.uart.rx.handle {
                        let commands = write
                            .data()
                            .iter()
                            .filter_map(|&b| line_reader.feed(b).and_then(comm::parse_command));
                        for cmd in commands {
                            let _ = CMD_CHANNEL.try_send(cmd);
                        }
                    }
                }
                if let Ok(reply) = event.accept() {
                    reply.send().await;
                }
            }
            embassy_futures::select::Either::Second(_) => {}
        }
    }

    BLE_CLIENTS.fetch_sub(1, Ordering::Relaxed);
    log::info!("BLE client disconnected");
}

/// Runs every observation through the shared detector. The lock is held
/// only for `process`; sending happens after it is released.
#[embassy_executor::task]
async fn detection_task() {
    let scan_rx = SCAN_CHANNEL.receiver();

    loop {
        let obs = scan_rx.receive().await;
        if !SCANNING.load(Ordering::Relaxed) {
            continue;
        }
        if let Some(event) = DETECTOR.process(&obs, now_ms()) {
            OutputSink.send(&DeviceMessage::Detection(&event));
        }
    }
}

/// Heartbeat, timeout, channel hopping and the test button.
#[embassy_executor::task]
async fn poll_task(button: Input<'static>) {
    let mut hopper = ChannelHopper::default();
    let mut test_button = TestButton::new();

    loop {
        let now = now_ms();

        if let Some(signal) = DETECTOR.poll(now) {
            OutputSink.send(&signal.to_message());
        }

        if SCANNING.load(Ordering::Relaxed) {
            if let Some(ch) = hopper.poll(now) {
                unsafe {
                    esp_wifi_set_channel(ch, 0);
                }
                CURRENT_CHANNEL.store(ch, Ordering::Relaxed);
            }
        }

        if test_button.update(button.is_high(), now) {
            let event = DETECTOR.with(|d| d.inject_test_detection(now));
            OutputSink.send(&DeviceMessage::Detection(&event));
        }

        Timer::after(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

/// Writes every output line to serial and forwards a copy to BLE.
#[embassy_executor::task]
async fn output_serial_task() {
    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;

        if BLE_CLIENTS.load(Ordering::Relaxed) > 0 {
            let _ = BLE_OUTPUT_CHANNEL.try_send(msg.clone());
        }

        if let Ok(s) = core::str::from_utf8(&msg) {
            esp_println::print!("{}", s);
        }
    }
}

#[embassy_executor::task]
async fn status_task() {
    loop {
        Timer::after(Duration::from_secs(STATUS_INTERVAL_SECS)).await;
        send_status();
    }
}

/// Applies host commands and answers status requests.
#[embassy_executor::task]
async fn command_task() {
    let cmd_rx = CMD_CHANNEL.receiver();

    loop {
        let cmd = cmd_rx.receive().await;
        let mut scanning = SCANNING.load(Ordering::Relaxed);
        let wants_status = DETECTOR.with(|d| comm::handle_command(cmd, d, &mut scanning));
        SCANNING.store(scanning, Ordering::Relaxed);

        if wants_status {
            send_status();
        }
    }
}
