use std::{
    cell::RefCell,
    ffi::CString,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{
        delay::Ets,
        gpio::{AnyIOPin, Gpio18, Gpio23, Output, PinDriver},
        i2c::{I2cConfig, I2cDriver},
        modem::Modem,
        prelude::*,
        spi::{config::Config as SpiConfig, SpiDeviceDriver, SpiDriver, SpiDriverConfig},
    },
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use mipidsi::{
    interface::SpiInterface,
    models::ST7789,
    options::{ColorInversion, Orientation, Rotation},
    Builder,
};
use sht4x::{Precision, Sht4x};

use weather_common::{
    bmp280::Bmp280,
    draw_frame, load_template, sample,
    sensor::finite,
    summary, ClimateReading, ClimateSensor, DisplayFrame, LinkAction, LinkWatch, NetworkConfig,
    SamplingSchedule, SensorError, StationConfig, WeatherHistory, ROUTE_READ, SPIFFS_BASE_PATH,
};

const WATCHDOG_TIMEOUT_SEC: u32 = 90;
const WIFI_RECONNECT_INTERVAL_MS: u64 = 30_000;
const WIFI_RETRY_DELAY_MS: u64 = 1_000;
const SENSOR_RETRY_DELAY_MS: u64 = 1_000;
const SPIFFS_MAX_FILES: usize = 4;

// ST7789 135x240 panel wiring (M5StickC Plus).
const PANEL_WIDTH: u16 = 135;
const PANEL_HEIGHT: u16 = 240;
const PANEL_OFFSET: (u16, u16) = (52, 40);

const SHT4X: &str = "SHT4x";

type SharedI2c = RefCellDevice<'static, I2cDriver<'static>>;
type PanelInterface = SpiInterface<
    'static,
    SpiDeviceDriver<'static, SpiDriver<'static>>,
    PinDriver<'static, Gpio23, Output>,
>;
type Panel = mipidsi::Display<PanelInterface, ST7789, PinDriver<'static, Gpio18, Output>>;

struct Sht4xClimate<I> {
    sensor: Sht4x<I, Ets>,
    delay: Ets,
}

impl<I: I2c> Sht4xClimate<I> {
    fn new(i2c: I, address: u8) -> Self {
        Self {
            sensor: Sht4x::new_with_address(i2c, sht4x_address(address)),
            delay: Ets,
        }
    }

    fn probe(&mut self) {
        match self.sensor.serial_number(&mut self.delay) {
            Ok(serial) => info!("SHT4x OK, serial number {serial}"),
            Err(err) => warn!("SHT4x Error: {err:?}"),
        }
    }
}

impl<I: I2c> ClimateSensor for Sht4xClimate<I> {
    fn read_climate(&mut self) -> Result<ClimateReading, SensorError> {
        let measurement = self
            .sensor
            .measure(Precision::High, &mut self.delay)
            .map_err(|err| SensorError::Bus {
                sensor: SHT4X,
                details: format!("{err:?}"),
            })?;

        Ok(ClimateReading {
            temperature_c: finite(SHT4X, measurement.temperature_celsius().to_num::<f32>())?,
            humidity_pct: finite(SHT4X, measurement.humidity_percent().to_num::<f32>())?,
        })
    }
}

struct StationPanel {
    panel: Panel,
}

impl StationPanel {
    fn present(&mut self, frame: &DisplayFrame) -> anyhow::Result<()> {
        draw_frame(&mut self.panel, frame).map_err(|err| anyhow!("display draw failed: {err:?}"))
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = StationConfig::default();
    apply_build_credentials(&mut config);
    config.sanitize();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem, pins, spi2, i2c0, ..
    } = Peripherals::take()?;

    let mut panel = create_panel(spi2, pins.gpio13, pins.gpio15, pins.gpio5, pins.gpio23, pins.gpio18)
        .context("failed to initialize display")?;

    // Pin numbers come from the board config; nothing else claims them.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(config.hardware.i2c_sda),
            AnyIOPin::new(config.hardware.i2c_scl),
        )
    };
    let i2c = I2cDriver::new(
        i2c0,
        sda,
        scl,
        &I2cConfig::new().baudrate(config.hardware.i2c_baudrate_hz.Hz().into()),
    )?;
    let bus: &'static RefCell<I2cDriver<'static>> = Box::leak(Box::new(RefCell::new(i2c)));

    let mut barometer = init_barometer(bus, config.hardware.bmp280_address, &mut panel);
    info!("BMP280 OK!");

    let mut climate = Sht4xClimate::new(RefCellDevice::new(bus), config.hardware.sht4x_address);
    climate.probe();

    let (wifi, address) = connect_wifi(
        modem,
        sys_loop,
        nvs_partition,
        &config.network,
        &mut panel,
    )
    .context("wifi startup failed")?;
    info!("Connected to Wi-Fi, IP address: {address}");
    disable_wifi_power_save();

    let history = Arc::new(Mutex::new(WeatherHistory::new(
        config.sampling.history_capacity,
    )));

    if let Err(err) = mount_spiffs() {
        warn!("An Error has occurred while mounting SPIFFS: {err:#}");
    }

    let template_path = format!("{SPIFFS_BASE_PATH}{}", config.report.template_path);
    let server = create_http_server(history.clone(), template_path, config.network.http_port)?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;
    let schedule = SamplingSchedule::from_config(&config.sampling);
    let mut link = LinkWatch::new(Duration::from_millis(WIFI_RECONNECT_INTERVAL_MS));

    loop {
        feed_watchdog();
        maintain_wifi_health(&mut link);

        let outcome = sample(&mut barometer, &mut climate);
        if outcome.is_complete() {
            info!("{}", summary(&outcome));
        } else {
            warn!("{}", summary(&outcome));
        }

        history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(&outcome);

        if let Err(err) = panel.present(&DisplayFrame::for_cycle(&address, &outcome)) {
            warn!("{err:#}");
        }

        for slice in schedule.slices() {
            feed_watchdog();
            maintain_wifi_health(&mut link);
            thread::sleep(slice);
        }
    }
}

fn init_barometer(
    bus: &'static RefCell<I2cDriver<'static>>,
    address: u8,
    panel: &mut StationPanel,
) -> Bmp280<SharedI2c, Ets> {
    loop {
        match Bmp280::new(RefCellDevice::new(bus), address, Ets) {
            Ok(sensor) => return sensor,
            Err(err) => {
                warn!("BMP280 fail: {err}");
                if let Err(err) = panel.present(&DisplayFrame::message(["BMP280 fail"])) {
                    warn!("{err:#}");
                }
                thread::sleep(Duration::from_millis(SENSOR_RETRY_DELAY_MS));
            }
        }
    }
}

fn create_panel(
    spi: esp_idf_svc::hal::spi::SPI2,
    sclk: esp_idf_svc::hal::gpio::Gpio13,
    sdo: esp_idf_svc::hal::gpio::Gpio15,
    cs: esp_idf_svc::hal::gpio::Gpio5,
    dc: Gpio23,
    rst: Gpio18,
) -> anyhow::Result<StationPanel> {
    let spi = SpiDeviceDriver::new_single(
        spi,
        sclk,
        sdo,
        Option::<AnyIOPin>::None,
        Some(cs),
        &SpiDriverConfig::new(),
        &SpiConfig::new().baudrate(26.MHz().into()),
    )?;
    let dc = PinDriver::output(dc)?;
    let rst = PinDriver::output(rst)?;

    let buffer: &'static mut [u8; 512] = Box::leak(Box::new([0_u8; 512]));
    let interface = SpiInterface::new(spi, dc, buffer);

    let panel = Builder::new(ST7789, interface)
        .reset_pin(rst)
        .display_size(PANEL_WIDTH, PANEL_HEIGHT)
        .display_offset(PANEL_OFFSET.0, PANEL_OFFSET.1)
        .invert_colors(ColorInversion::Inverted)
        .orientation(Orientation::new().rotate(Rotation::Deg90))
        .init(&mut Ets)
        .map_err(|err| anyhow!("ST7789 init failed: {err:?}"))?;

    Ok(StationPanel { panel })
}

fn create_http_server(
    history: Arc<Mutex<WeatherHistory>>,
    template_path: String,
    http_port: u16,
) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port,
        stack_size: 16 * 1024,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>(ROUTE_READ, Method::Get, move |req| {
        info!("HTTP GET {ROUTE_READ}");

        let template = match load_template(&template_path) {
            Ok(template) => template,
            Err(err) => {
                warn!("report generation failed: {err}");
                req.into_response(
                    500,
                    Some("Internal Server Error"),
                    &[("Content-Type", "text/plain; charset=utf-8")],
                )?
                .write_all(err.to_string().as_bytes())?;
                return Ok(());
            }
        };

        let snapshot = history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();
        let html = template.render(&snapshot);

        req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?
            .write_all(html.as_bytes())?;
        Ok(())
    })?;

    Ok(server)
}

fn apply_build_credentials(config: &mut StationConfig) {
    if config.network.wifi_ssid.is_empty() {
        config.network.wifi_ssid = option_env!("WIFI_SSID").unwrap_or("CHANGE_ME").to_string();
    }

    if config.network.wifi_pass.is_empty() {
        config.network.wifi_pass = option_env!("WIFI_PASS").unwrap_or("CHANGE_ME").to_string();
    }
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
    panel: &mut StationPanel,
) -> anyhow::Result<(EspWifi<'static>, String)> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt: u64 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        if let Err(err) = panel.present(&DisplayFrame::message(["Connecting to WiFi..."])) {
            warn!("{err:#}");
        }

        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => {
                info!("wifi connected and netif up on attempt {attempt}");
                break;
            }
            Err(err) => {
                warn!("Connecting to WiFi... attempt {attempt} failed: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }
    }

    let address = wifi.wifi().sta_netif().get_ip_info()?.ip.to_string();
    drop(wifi);
    Ok((esp_wifi, address))
}

fn mount_spiffs() -> anyhow::Result<()> {
    let base_path = CString::new(SPIFFS_BASE_PATH)?;
    let conf = esp_idf_svc::sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: SPIFFS_MAX_FILES,
        format_if_mount_failed: false,
    };

    let rc = unsafe { esp_idf_svc::sys::esp_vfs_spiffs_register(&conf) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("SPIFFS mounted at {SPIFFS_BASE_PATH}");
        return Ok(());
    }
    Err(anyhow!("esp_vfs_spiffs_register failed with code {}", rc))
}

fn sht4x_address(raw: u8) -> sht4x::Address {
    match raw {
        0x45 => sht4x::Address::Address0x45,
        0x46 => sht4x::Address::Address0x46,
        _ => sht4x::Address::Address0x44,
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn is_wifi_station_connected() -> bool {
    let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
    rc == esp_idf_svc::sys::ESP_OK
}

fn maintain_wifi_health(link: &mut LinkWatch) {
    if link.observe(is_wifi_station_connected(), Instant::now()) != LinkAction::Reconnect {
        return;
    }

    warn!(
        "wifi disconnected for {}s; retrying connect",
        WIFI_RECONNECT_INTERVAL_MS / 1000
    );
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_connect() };
    if rc != esp_idf_svc::sys::ESP_OK {
        warn!("esp_wifi_connect failed: esp_err_t={rc}");
    }
}
